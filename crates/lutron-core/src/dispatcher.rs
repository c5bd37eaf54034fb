//! Applies parsed LIP messages to the registry

use crate::device::{Keypad, OccupancyGroup, Output, Sysvar};
use crate::registry::Registry;
use crate::system::{DeviceKind, SystemEvent};
use chrono::Utc;
use lip_protocol::action::{GroupAction, SysvarAction};
use lip_protocol::{DeviceAction, LipAction, LipGroupState, LipLedState, LipMessage, LipMode, OutputAction};

/// Level changes smaller than this are not reported
const LEVEL_EPSILON: f64 = 0.005;

/// Update the registry from one message and return what changed
///
/// Integration IDs that are not yet known are added, with a
/// [`SystemEvent::DeviceDiscovered`] event ahead of the state event.
pub fn dispatch(registry: &Registry, message: &LipMessage) -> Vec<SystemEvent> {
    let mut events = Vec::new();

    match message.mode {
        LipMode::Output => apply_output(registry, message, &mut events),
        LipMode::Device => apply_device(registry, message, &mut events),
        LipMode::Group => apply_group(registry, message, &mut events),
        LipMode::Sysvar => apply_sysvar(registry, message, &mut events),
        LipMode::Error => {
            tracing::warn!("Repeater reported error: {}", message.raw);
            events.push(SystemEvent::RepeaterError {
                raw: message.raw.clone(),
            });
        }
        LipMode::Monitoring | LipMode::KeepAlive => {}
        LipMode::Unknown => tracing::debug!("Ignoring unmodelled message: {}", message.raw),
    }

    events
}

fn apply_output(registry: &Registry, message: &LipMessage, events: &mut Vec<SystemEvent>) {
    let Some(integration_id) = message.integration_id else {
        return;
    };

    match message.action() {
        Some(LipAction::Output(OutputAction::Level)) => {
            let level = message.value_f64().unwrap_or(0.0);
            let mut entry = registry.outputs.entry(integration_id).or_insert_with(|| {
                events.push(SystemEvent::DeviceDiscovered {
                    kind: DeviceKind::Output,
                    integration_id,
                });
                Output::new(integration_id)
            });
            let changed = entry
                .level
                .map_or(true, |previous| (previous - level).abs() > LEVEL_EPSILON);
            entry.level = Some(level);
            entry.last_updated = Some(Utc::now());
            drop(entry);

            if changed {
                events.push(SystemEvent::OutputChanged {
                    integration_id,
                    level,
                });
            }
        }
        Some(action) => {
            tracing::debug!("Output {} action {:?}", integration_id, action);
        }
        None => {}
    }
}

fn apply_device(registry: &Registry, message: &LipMessage, events: &mut Vec<SystemEvent>) {
    let (Some(integration_id), Some(component)) = (message.integration_id, message.component_number)
    else {
        return;
    };
    let Some(LipAction::Device(action)) = message.action() else {
        tracing::debug!("Unhandled device action: {}", message.raw);
        return;
    };

    let mut keypad = registry.keypads.entry(integration_id).or_insert_with(|| {
        events.push(SystemEvent::DeviceDiscovered {
            kind: DeviceKind::Keypad,
            integration_id,
        });
        Keypad::new(integration_id)
    });

    match action {
        DeviceAction::Press
        | DeviceAction::Release
        | DeviceAction::Hold
        | DeviceAction::DoubleTap
        | DeviceAction::HoldRelease => {
            let button = keypad.button_mut(component);
            button.last_action = Some(action);
            button.last_updated = Some(Utc::now());
            events.push(SystemEvent::ButtonEvent {
                integration_id,
                component,
                action,
            });
        }
        DeviceAction::LedState => {
            #[allow(clippy::cast_possible_truncation)]
            let code = message.value_f64().unwrap_or(0.0).round() as i64;
            match LipLedState::try_from(code) {
                Ok(state) => {
                    if keypad.leds.insert(component, state) != Some(state) {
                        events.push(SystemEvent::LedChanged {
                            integration_id,
                            component,
                            state,
                        });
                    }
                }
                Err(code) => tracing::warn!(
                    "Keypad {} LED {} reported unknown state {}",
                    integration_id,
                    component,
                    code
                ),
            }
        }
        DeviceAction::Enable | DeviceAction::Disable | DeviceAction::LightLevel => {
            tracing::debug!(
                "Keypad {} component {} {:?}",
                integration_id,
                component,
                action
            );
        }
    }
}

fn apply_group(registry: &Registry, message: &LipMessage, events: &mut Vec<SystemEvent>) {
    let Some(integration_id) = message.integration_id else {
        return;
    };
    if message.action() != Some(LipAction::Group(GroupAction::OccupancyState)) {
        tracing::debug!("Unhandled group action: {}", message.raw);
        return;
    }

    let state = LipGroupState::from(message.state_code().unwrap_or(-1));
    let mut group = registry.groups.entry(integration_id).or_insert_with(|| {
        events.push(SystemEvent::DeviceDiscovered {
            kind: DeviceKind::OccupancyGroup,
            integration_id,
        });
        OccupancyGroup::new(integration_id)
    });
    let changed = group.state != state;
    group.state = state;
    group.last_updated = Some(Utc::now());
    drop(group);

    if changed {
        events.push(SystemEvent::OccupancyChanged {
            integration_id,
            state,
        });
    }
}

fn apply_sysvar(registry: &Registry, message: &LipMessage, events: &mut Vec<SystemEvent>) {
    let (Some(integration_id), Some(value)) = (message.integration_id, message.state_code()) else {
        return;
    };
    if message.action() != Some(LipAction::Sysvar(SysvarAction::State)) {
        tracing::debug!("Unhandled sysvar action: {}", message.raw);
        return;
    }

    let mut sysvar = registry.sysvars.entry(integration_id).or_insert_with(|| {
        events.push(SystemEvent::DeviceDiscovered {
            kind: DeviceKind::Sysvar,
            integration_id,
        });
        Sysvar::new(integration_id)
    });
    let changed = sysvar.value != Some(value);
    sysvar.value = Some(value);
    sysvar.last_updated = Some(Utc::now());
    drop(sysvar);

    if changed {
        events.push(SystemEvent::SysvarChanged {
            integration_id,
            value,
        });
    }
}
