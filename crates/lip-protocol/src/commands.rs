//! Outbound command construction

use crate::action::{DeviceAction, GroupAction, OutputAction, SysvarAction};
use crate::types::LipOperation;
use std::fmt;
use std::time::Duration;

/// Keep-alive query sent while connected
pub const KEEPALIVE_COMMAND: &str = "?SYSTEM,10";

/// Commands sent to the repeater
#[derive(Debug, Clone, PartialEq)]
pub enum LipCommand {
    /// `#OUTPUT,<id>,1,<level>[,<fade>]`
    SetOutputLevel {
        integration_id: u32,
        level: f64,
        fade: Option<Duration>,
    },
    /// `#OUTPUT,<id>,<action>` for raise/lower/stop style actions
    OutputAction {
        integration_id: u32,
        action: OutputAction,
    },
    /// `?OUTPUT,<id>,1`
    QueryOutputLevel { integration_id: u32 },
    /// `#DEVICE,<id>,<component>,<action>`
    DeviceAction {
        integration_id: u32,
        component: u32,
        action: DeviceAction,
    },
    /// `?DEVICE,<id>,<component>,9`
    QueryLedState { integration_id: u32, component: u32 },
    /// `?GROUP,<id>,3`
    QueryGroupState { integration_id: u32 },
    /// `#SYSVAR,<id>,1,<value>`
    SetSysvar { integration_id: u32, value: i64 },
    /// `?SYSVAR,<id>,1`
    QuerySysvar { integration_id: u32 },
    /// `?SYSTEM,10`
    KeepAlive,
    /// A line passed through unchanged
    Raw(String),
}

impl LipCommand {
    /// Press followed by release, as a keypad tap produces on the wire
    #[must_use]
    pub fn tap(integration_id: u32, component: u32) -> [Self; 2] {
        [
            LipCommand::DeviceAction {
                integration_id,
                component,
                action: DeviceAction::Press,
            },
            LipCommand::DeviceAction {
                integration_id,
                component,
                action: DeviceAction::Release,
            },
        ]
    }

    /// Wire text without terminator
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        let exec = LipOperation::Execute.prefix();
        let query = LipOperation::Query.prefix();
        match self {
            LipCommand::SetOutputLevel {
                integration_id,
                level,
                fade,
            } => {
                let level = level.clamp(0.0, 100.0);
                let action = OutputAction::Level as u32;
                match fade {
                    Some(fade) => format!(
                        "{exec}OUTPUT,{integration_id},{action},{level:.2},{}",
                        format_fade(*fade)
                    ),
                    None => format!("{exec}OUTPUT,{integration_id},{action},{level:.2}"),
                }
            }
            LipCommand::OutputAction {
                integration_id,
                action,
            } => format!("{exec}OUTPUT,{integration_id},{}", *action as u32),
            LipCommand::QueryOutputLevel { integration_id } => {
                format!("{query}OUTPUT,{integration_id},{}", OutputAction::Level as u32)
            }
            LipCommand::DeviceAction {
                integration_id,
                component,
                action,
            } => format!("{exec}DEVICE,{integration_id},{component},{}", *action as u32),
            LipCommand::QueryLedState {
                integration_id,
                component,
            } => format!(
                "{query}DEVICE,{integration_id},{component},{}",
                DeviceAction::LedState as u32
            ),
            LipCommand::QueryGroupState { integration_id } => format!(
                "{query}GROUP,{integration_id},{}",
                GroupAction::OccupancyState as u32
            ),
            LipCommand::SetSysvar {
                integration_id,
                value,
            } => format!(
                "{exec}SYSVAR,{integration_id},{},{value}",
                SysvarAction::State as u32
            ),
            LipCommand::QuerySysvar { integration_id } => {
                format!("{query}SYSVAR,{integration_id},{}", SysvarAction::State as u32)
            }
            LipCommand::KeepAlive => KEEPALIVE_COMMAND.to_string(),
            LipCommand::Raw(line) => line.clone(),
        }
    }
}

impl fmt::Display for LipCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

/// Fade times are sent as `SS`, `MM:SS` or `HH:MM:SS`
fn format_fade(fade: Duration) -> String {
    let total = fade.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes}:{seconds:02}")
    } else {
        format!("{seconds}")
    }
}
