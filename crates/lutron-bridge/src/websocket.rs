//! WebSocket handler for real-time updates

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use lip_protocol::{DeviceAction, LipConnectionState, LipGroupState, LipLedState};
use lutron_core::{DeviceKind, SystemEvent};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    DeviceDiscovered {
        kind: DeviceKind,
        integration_id: u32,
    },
    OutputChanged {
        integration_id: u32,
        level: f64,
        on: bool,
    },
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
    RepeaterError {
        raw: String,
    },
    RepeaterStateChanged {
        connected: bool,
        state: LipConnectionState,
    },
}

impl From<SystemEvent> for WsEvent {
    fn from(event: SystemEvent) -> Self {
        match event {
            SystemEvent::DeviceDiscovered {
                kind,
                integration_id,
            } => WsEvent::DeviceDiscovered {
                kind,
                integration_id,
            },
            SystemEvent::OutputChanged {
                integration_id,
                level,
            } => WsEvent::OutputChanged {
                integration_id,
                level,
                on: level > 0.0,
            },
            SystemEvent::ButtonEvent {
                integration_id,
                component,
                action,
            } => WsEvent::ButtonEvent {
                integration_id,
                component,
                action,
            },
            SystemEvent::LedChanged {
                integration_id,
                component,
                state,
            } => WsEvent::LedChanged {
                integration_id,
                component,
                state,
            },
            SystemEvent::OccupancyChanged {
                integration_id,
                state,
            } => WsEvent::OccupancyChanged {
                integration_id,
                state,
            },
            SystemEvent::SysvarChanged {
                integration_id,
                value,
            } => WsEvent::SysvarChanged {
                integration_id,
                value,
            },
            SystemEvent::RepeaterError { raw } => WsEvent::RepeaterError { raw },
            SystemEvent::ConnectionChanged { state } => WsEvent::RepeaterStateChanged {
                connected: state == LipConnectionState::Connected,
                state,
            },
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Ok(connected_msg) = serde_json::to_string(&WsEvent::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    // Forward system events to the client
    let mut event_rx = state.system.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&WsEvent::from(event)) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to encode WebSocket event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("WebSocket client skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_event_shape() {
        let event = WsEvent::from(SystemEvent::OutputChanged {
            integration_id: 5,
            level: 0.0,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "output_changed");
        assert_eq!(json["integration_id"], 5);
        assert_eq!(json["on"], false);
    }

    #[test]
    fn test_connection_event_shape() {
        let event = WsEvent::from(SystemEvent::ConnectionChanged {
            state: LipConnectionState::Connected,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "repeater_state_changed");
        assert_eq!(json["connected"], true);
        assert_eq!(json["state"], "connected");
    }
}
