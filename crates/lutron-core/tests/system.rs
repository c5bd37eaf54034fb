//! System behaviour against a scripted repeater on a loopback socket

use lip_protocol::{LipConfig, LipConnectionState};
use lutron_core::persistence::InventoryStore;
use lutron_core::{DeviceKind, Inventory, LutronSystem, Output, SystemEvent};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

async fn accept_and_login(listener: &TcpListener) -> BufReader<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut conn = BufReader::new(stream);
    conn.get_mut().write_all(b"login: ").await.unwrap();
    read_line(&mut conn).await;
    conn.get_mut().write_all(b"password: ").await.unwrap();
    read_line(&mut conn).await;
    conn.get_mut().write_all(b"\r\nGNET> ").await.unwrap();
    conn
}

async fn read_line(conn: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    conn.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

async fn next_matching(
    rx: &mut broadcast::Receiver<SystemEvent>,
    pred: impl Fn(&SystemEvent) -> bool,
) -> SystemEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_refresh_on_connect_and_discovery() {
    let dir = std::env::temp_dir().join(format!("lutron-core-system-{}", std::process::id()));
    let path = dir.join("inventory.json");
    let mut kitchen = Output::new(5);
    kitchen.name = Some("Kitchen".into());
    let store = InventoryStore::new(&path);
    store
        .save(&Inventory {
            outputs: vec![kitchen],
            ..Inventory::default()
        })
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = LipConfig::new(addr.ip().to_string());
    config.port = addr.port();

    let system = LutronSystem::new(config, Some(path.clone())).await;
    let mut events = system.subscribe();

    let mut conn = accept_and_login(&listener).await;
    assert_eq!(read_line(&mut conn).await, "?OUTPUT,5,1");
    conn.get_mut()
        .write_all(b"~OUTPUT,5,1,20.00\r\n~OUTPUT,7,1,100.00\r\n")
        .await
        .unwrap();

    next_matching(&mut events, |e| {
        matches!(
            e,
            SystemEvent::ConnectionChanged {
                state: LipConnectionState::Connected
            }
        )
    })
    .await;
    next_matching(&mut events, |e| {
        matches!(e, SystemEvent::OutputChanged { integration_id: 5, .. })
    })
    .await;
    next_matching(&mut events, |e| {
        matches!(
            e,
            SystemEvent::DeviceDiscovered {
                kind: DeviceKind::Output,
                integration_id: 7
            }
        )
    })
    .await;

    assert_eq!(system.registry().output(5).unwrap().level, Some(20.0));
    assert_eq!(
        system.registry().output(5).unwrap().name.as_deref(),
        Some("Kitchen")
    );

    system
        .set_level(7, 50.0, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(read_line(&mut conn).await, "#OUTPUT,7,1,50.00,2");

    system.set_sysvar(44, 2).await.unwrap();
    assert_eq!(read_line(&mut conn).await, "#SYSVAR,44,1,2");

    system.press_button(7, 1).await.unwrap_err();

    // Discovery is persisted in the background
    let mut saved = false;
    for _ in 0..50 {
        if store.load().await.outputs.len() == 2 {
            saved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(saved);

    system.shutdown().await;
    let _ = std::fs::remove_dir_all(&dir);
}
