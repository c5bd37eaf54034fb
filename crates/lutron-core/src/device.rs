//! Lutron device representation

use chrono::{DateTime, Utc};
use lip_protocol::{DeviceAction, LipGroupState, LipLedState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an output drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Dimmer,
    Switch,
    Shade,
    Fan,
    Other,
}

/// A dimmer, switch or shade addressed with `OUTPUT`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub integration_id: u32,
    pub name: Option<String>,
    pub area: Option<String>,
    #[serde(default)]
    pub kind: OutputKind,
    /// Last reported level, 0.0-100.0
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Output {
    #[must_use]
    pub fn new(integration_id: u32) -> Self {
        Self {
            integration_id,
            name: None,
            area: None,
            kind: OutputKind::default(),
            level: None,
            last_updated: None,
        }
    }

    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.level.map(|level| level > 0.0)
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Output {}", self.integration_id))
    }
}

/// A keypad button
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    pub component: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub last_action: Option<DeviceAction>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Button {
    #[must_use]
    pub fn new(component: u32) -> Self {
        Self {
            component,
            name: None,
            last_action: None,
            last_updated: None,
        }
    }
}

/// A keypad, remote or other `DEVICE`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypad {
    pub integration_id: u32,
    pub name: Option<String>,
    pub area: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    /// LED component number to state
    #[serde(default)]
    pub leds: BTreeMap<u32, LipLedState>,
}

impl Keypad {
    #[must_use]
    pub fn new(integration_id: u32) -> Self {
        Self {
            integration_id,
            name: None,
            area: None,
            buttons: Vec::new(),
            leds: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn button(&self, component: u32) -> Option<&Button> {
        self.buttons.iter().find(|b| b.component == component)
    }

    /// Get a button, adding it if it has not been seen before
    pub fn button_mut(&mut self, component: u32) -> &mut Button {
        if let Some(idx) = self.buttons.iter().position(|b| b.component == component) {
            &mut self.buttons[idx]
        } else {
            self.buttons.push(Button::new(component));
            self.buttons.sort_by_key(|b| b.component);
            let idx = self
                .buttons
                .iter()
                .position(|b| b.component == component)
                .unwrap_or(self.buttons.len() - 1);
            &mut self.buttons[idx]
        }
    }
}

/// An occupancy group (`GROUP`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyGroup {
    pub integration_id: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub state: LipGroupState,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl OccupancyGroup {
    #[must_use]
    pub fn new(integration_id: u32) -> Self {
        Self {
            integration_id,
            name: None,
            state: LipGroupState::Unknown,
            last_updated: None,
        }
    }
}

/// A system variable (`SYSVAR`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sysvar {
    pub integration_id: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Sysvar {
    #[must_use]
    pub fn new(integration_id: u32) -> Self {
        Self {
            integration_id,
            name: None,
            value: None,
            last_updated: None,
        }
    }
}

/// Everything known about the installation, as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub keypads: Vec<Keypad>,
    #[serde(default)]
    pub groups: Vec<OccupancyGroup>,
    #[serde(default)]
    pub sysvars: Vec<Sysvar>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_mut_inserts_sorted() {
        let mut keypad = Keypad::new(12);
        keypad.button_mut(4);
        keypad.button_mut(1);
        keypad.button_mut(4).name = Some("Scene 4".into());

        let components: Vec<u32> = keypad.buttons.iter().map(|b| b.component).collect();
        assert_eq!(components, vec![1, 4]);
        assert_eq!(keypad.button(4).unwrap().name.as_deref(), Some("Scene 4"));
    }

    #[test]
    fn test_inventory_defaults_missing_sections() {
        let inventory: Inventory =
            serde_json::from_str(r#"{"outputs":[{"integration_id":5,"name":"Kitchen","area":null}]}"#)
                .unwrap();
        assert_eq!(inventory.outputs.len(), 1);
        assert_eq!(inventory.outputs[0].kind, OutputKind::Dimmer);
        assert!(inventory.keypads.is_empty());
    }

    #[test]
    fn test_output_display_name() {
        let mut output = Output::new(3);
        assert_eq!(output.display_name(), "Output 3");
        output.name = Some("Porch".into());
        assert_eq!(output.display_name(), "Porch");
        assert_eq!(output.is_on(), None);
    }
}
