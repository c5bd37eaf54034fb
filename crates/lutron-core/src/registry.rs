//! In-memory registry of known devices

use crate::device::{Inventory, Keypad, OccupancyGroup, Output, Sysvar};
use dashmap::DashMap;

/// Known outputs, keypads, groups and variables, keyed by integration ID
#[derive(Default)]
pub struct Registry {
    pub(crate) outputs: DashMap<u32, Output>,
    pub(crate) keypads: DashMap<u32, Keypad>,
    pub(crate) groups: DashMap<u32, OccupancyGroup>,
    pub(crate) sysvars: DashMap<u32, Sysvar>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_inventory(inventory: Inventory) -> Self {
        let registry = Self::new();
        for output in inventory.outputs {
            registry.outputs.insert(output.integration_id, output);
        }
        for keypad in inventory.keypads {
            registry.keypads.insert(keypad.integration_id, keypad);
        }
        for group in inventory.groups {
            registry.groups.insert(group.integration_id, group);
        }
        for sysvar in inventory.sysvars {
            registry.sysvars.insert(sysvar.integration_id, sysvar);
        }
        registry
    }

    /// Snapshot of everything, sorted by integration ID
    #[must_use]
    pub fn inventory(&self) -> Inventory {
        Inventory {
            outputs: self.outputs(),
            keypads: self.keypads(),
            groups: self.groups(),
            sysvars: self.sysvars(),
        }
    }

    #[must_use]
    pub fn outputs(&self) -> Vec<Output> {
        sorted(&self.outputs, |o| o.integration_id)
    }

    #[must_use]
    pub fn output(&self, integration_id: u32) -> Option<Output> {
        self.outputs.get(&integration_id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn keypads(&self) -> Vec<Keypad> {
        sorted(&self.keypads, |k| k.integration_id)
    }

    #[must_use]
    pub fn keypad(&self, integration_id: u32) -> Option<Keypad> {
        self.keypads.get(&integration_id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn groups(&self) -> Vec<OccupancyGroup> {
        sorted(&self.groups, |g| g.integration_id)
    }

    #[must_use]
    pub fn sysvars(&self) -> Vec<Sysvar> {
        sorted(&self.sysvars, |s| s.integration_id)
    }

    /// Add or replace an output
    pub fn upsert_output(&self, output: Output) {
        self.outputs.insert(output.integration_id, output);
    }

    /// Add or replace a keypad
    pub fn upsert_keypad(&self, keypad: Keypad) {
        self.keypads.insert(keypad.integration_id, keypad);
    }

    #[must_use]
    pub fn output_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.outputs.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn group_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.groups.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn sysvar_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sysvars.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.outputs.len(),
            self.keypads.len(),
            self.groups.len(),
            self.sysvars.len(),
        )
    }
}

fn sorted<T: Clone>(map: &DashMap<u32, T>, key: impl Fn(&T) -> u32) -> Vec<T> {
    let mut items: Vec<T> = map.iter().map(|r| r.value().clone()).collect();
    items.sort_by_key(|item| key(item));
    items
}
