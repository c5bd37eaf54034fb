//! Lutron system management

use crate::device::{Inventory, Keypad, Output};
use crate::dispatcher;
use crate::error::CoreError;
use crate::persistence::InventoryStore;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use lip_protocol::{
    DeviceAction, LipCommand, LipConfig, LipConnection, LipConnectionState, LipGroupState,
    LipLedState,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

/// Which registry a discovered integration ID was added to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Output,
    Keypad,
    OccupancyGroup,
    Sysvar,
}

/// System events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    /// An integration ID was seen for the first time
    DeviceDiscovered {
        kind: DeviceKind,
        integration_id: u32,
    },
    OutputChanged {
        integration_id: u32,
        level: f64,
    },
    /// Press, release, hold, double tap or hold release
    ButtonEvent {
        integration_id: u32,
        component: u32,
        action: DeviceAction,
    },
    LedChanged {
        integration_id: u32,
        component: u32,
        state: LipLedState,
    },
    OccupancyChanged {
        integration_id: u32,
        state: LipGroupState,
    },
    SysvarChanged {
        integration_id: u32,
        value: i64,
    },
    /// `~ERROR` reply from the repeater
    RepeaterError { raw: String },
    ConnectionChanged { state: LipConnectionState },
}

/// System status information
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub connection: LipConnectionState,
    pub last_keepalive: Option<DateTime<Utc>>,
    pub output_count: usize,
    pub keypad_count: usize,
    pub group_count: usize,
    pub sysvar_count: usize,
}

/// Lutron system manager
pub struct LutronSystem {
    /// Supervised repeater connection
    connection: Arc<LipConnection>,
    /// Known devices
    registry: Arc<Registry>,
    /// Event broadcaster
    event_tx: broadcast::Sender<SystemEvent>,
    /// Inventory file, when persistence is enabled
    store: Option<Arc<InventoryStore>>,
}

impl LutronSystem {
    /// Load the stored inventory and start connecting to the repeater
    pub async fn new(config: LipConfig, data_path: Option<PathBuf>) -> Self {
        let store = data_path.map(|path| Arc::new(InventoryStore::new(path)));
        let inventory = match &store {
            Some(store) => store.load().await,
            None => Inventory::default(),
        };
        let registry = Arc::new(Registry::from_inventory(inventory));
        let connection = Arc::new(LipConnection::start(config));
        let (event_tx, _) = broadcast::channel(256);

        let system = Self {
            connection,
            registry,
            event_tx,
            store,
        };
        system.start_message_listener();
        system.start_state_listener();
        system
    }

    /// Apply repeater pushes to the registry
    fn start_message_listener(&self) {
        let registry = Arc::clone(&self.registry);
        let event_tx = self.event_tx.clone();
        let store = self.store.clone();
        let mut lip_rx = self.connection.subscribe();

        tokio::spawn(async move {
            loop {
                match lip_rx.recv().await {
                    Ok(message) => {
                        let events = dispatcher::dispatch(&registry, &message);
                        let discovered = events
                            .iter()
                            .any(|e| matches!(e, SystemEvent::DeviceDiscovered { .. }));

                        for event in events {
                            let _ = event_tx.send(event);
                        }

                        if discovered {
                            if let Some(ref store) = store {
                                let store = Arc::clone(store);
                                let registry = Arc::clone(&registry);
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        store.save_latest(|| registry.inventory()).await
                                    {
                                        tracing::warn!("Failed to save inventory: {}", e);
                                    }
                                });
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Message listener lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Message channel closed, stopping listener");
                        break;
                    }
                }
            }
        });
    }

    /// Report connection changes and re-query state after each login
    fn start_state_listener(&self) {
        let registry = Arc::clone(&self.registry);
        let event_tx = self.event_tx.clone();
        let connection = Arc::downgrade(&self.connection);
        let mut state_rx = self.connection.watch_state();

        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                tracing::info!("Repeater connection {:?}", state);
                let _ = event_tx.send(SystemEvent::ConnectionChanged { state });

                if state == LipConnectionState::Connected {
                    let Some(connection) = Weak::upgrade(&connection) else {
                        break;
                    };
                    match refresh_all(&connection, &registry).await {
                        Ok(sent) => tracing::debug!("Sent {} state queries", sent),
                        Err(e) => tracing::warn!("State refresh failed: {}", e),
                    }
                }
            }
        });
    }

    /// Set an output level (0-100), with an optional fade
    pub async fn set_level(
        &self,
        integration_id: u32,
        level: f64,
        fade: Option<Duration>,
    ) -> Result<(), CoreError> {
        if !(0.0..=100.0).contains(&level) {
            return Err(CoreError::InvalidLevel(level));
        }
        if self.registry.output(integration_id).is_none() {
            return Err(CoreError::OutputNotFound(integration_id));
        }

        tracing::info!("Setting output {} to {:.2}", integration_id, level);
        self.connection
            .send(&LipCommand::SetOutputLevel {
                integration_id,
                level,
                fade,
            })
            .await?;
        Ok(())
    }

    pub async fn turn_on(&self, integration_id: u32) -> Result<(), CoreError> {
        self.set_level(integration_id, 100.0, None).await
    }

    pub async fn turn_off(&self, integration_id: u32) -> Result<(), CoreError> {
        self.set_level(integration_id, 0.0, None).await
    }

    /// Set a system variable to one of its states
    pub async fn set_sysvar(&self, integration_id: u32, value: i64) -> Result<(), CoreError> {
        tracing::info!("Setting sysvar {} to {}", integration_id, value);
        self.connection
            .send(&LipCommand::SetSysvar {
                integration_id,
                value,
            })
            .await?;
        Ok(())
    }

    /// Press and release a keypad button
    pub async fn press_button(&self, integration_id: u32, component: u32) -> Result<(), CoreError> {
        if self.registry.keypad(integration_id).is_none() {
            return Err(CoreError::KeypadNotFound(integration_id));
        }

        tracing::info!("Tapping keypad {} button {}", integration_id, component);
        for command in LipCommand::tap(integration_id, component) {
            self.connection.send(&command).await?;
        }
        Ok(())
    }

    /// Query the state of every known output, group, sysvar and LED
    ///
    /// Answers arrive as ordinary pushes. Returns the number of queries sent.
    pub async fn refresh(&self) -> Result<usize, CoreError> {
        refresh_all(&self.connection, &self.registry).await
    }

    /// Register an output ahead of it reporting
    pub fn add_output(&self, output: Output) {
        self.registry.upsert_output(output);
    }

    /// Register a keypad ahead of it reporting
    pub fn add_keypad(&self, keypad: Keypad) {
        self.registry.upsert_keypad(keypad);
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn connection(&self) -> &LipConnection {
        &self.connection
    }

    #[must_use]
    pub fn status(&self) -> SystemStatus {
        let (output_count, keypad_count, group_count, sysvar_count) = self.registry.counts();
        SystemStatus {
            connection: self.connection.state(),
            last_keepalive: self.connection.last_keepalive().map(DateTime::<Utc>::from),
            output_count,
            keypad_count,
            group_count,
            sysvar_count,
        }
    }

    /// Subscribe to system events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the repeater connection
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }
}

async fn refresh_all(connection: &LipConnection, registry: &Registry) -> Result<usize, CoreError> {
    let mut queries: Vec<LipCommand> = Vec::new();
    queries.extend(
        registry
            .output_ids()
            .into_iter()
            .map(|integration_id| LipCommand::QueryOutputLevel { integration_id }),
    );
    queries.extend(
        registry
            .group_ids()
            .into_iter()
            .map(|integration_id| LipCommand::QueryGroupState { integration_id }),
    );
    queries.extend(
        registry
            .sysvar_ids()
            .into_iter()
            .map(|integration_id| LipCommand::QuerySysvar { integration_id }),
    );
    for keypad in registry.keypads() {
        queries.extend(keypad.leds.keys().map(|component| LipCommand::QueryLedState {
            integration_id: keypad.integration_id,
            component: *component,
        }));
    }

    for query in &queries {
        connection.send(query).await?;
    }
    Ok(queries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_protocol::ProtocolError;

    fn offline_config() -> LipConfig {
        let mut config = LipConfig::new("127.0.0.1");
        config.port = 9;
        config.login_timeout = Duration::from_millis(100);
        config
    }

    #[tokio::test]
    async fn test_set_level_validation() {
        let system = LutronSystem::new(offline_config(), None).await;
        system.add_output(Output::new(5));

        assert!(matches!(
            system.set_level(5, 120.0, None).await,
            Err(CoreError::InvalidLevel(_))
        ));
        assert!(matches!(
            system.set_level(5, f64::NAN, None).await,
            Err(CoreError::InvalidLevel(_))
        ));
        assert!(matches!(
            system.turn_on(6).await,
            Err(CoreError::OutputNotFound(6))
        ));
        assert!(matches!(
            system.turn_off(5).await,
            Err(CoreError::Protocol(ProtocolError::NotConnected))
        ));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_sysvar_while_offline() {
        let system = LutronSystem::new(offline_config(), None).await;
        assert!(matches!(
            system.set_sysvar(44, 2).await,
            Err(CoreError::Protocol(ProtocolError::NotConnected))
        ));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_press_button_requires_keypad() {
        let system = LutronSystem::new(offline_config(), None).await;
        assert!(matches!(
            system.press_button(12, 1).await,
            Err(CoreError::KeypadNotFound(12))
        ));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_counts() {
        let system = LutronSystem::new(offline_config(), None).await;
        system.add_output(Output::new(5));
        system.add_output(Output::new(6));
        system.add_keypad(Keypad::new(12));

        let status = system.status();
        assert_eq!(status.output_count, 2);
        assert_eq!(status.keypad_count, 1);
        assert_eq!(status.group_count, 0);
        assert!(status.last_keepalive.is_none());
        assert_ne!(status.connection, LipConnectionState::Connected);
        system.shutdown().await;
    }

    #[test]
    fn test_event_serialization() {
        let event = SystemEvent::ButtonEvent {
            integration_id: 12,
            component: 2,
            action: DeviceAction::DoubleTap,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "button_event");
        assert_eq!(json["action"], "double_tap");
    }
}
