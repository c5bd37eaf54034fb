//! Inventory persistence using JSON file storage

use crate::device::Inventory;
use crate::error::CoreError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// The inventory file, with writes serialized
///
/// Every save goes through a temp file next to the target and a rename, and
/// only one save runs at a time.
#[derive(Debug)]
pub struct InventoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl InventoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored inventory. A missing or unreadable file is empty.
    pub async fn load(&self) -> Inventory {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{:?} does not exist yet", self.path);
                return Inventory::default();
            }
            Err(e) => {
                tracing::warn!("Cannot read {:?}, using empty inventory: {}", self.path, e);
                return Inventory::default();
            }
        };

        let inventory = serde_json::from_str::<Inventory>(&contents).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed inventory {:?}: {}", self.path, e);
            Inventory::default()
        });
        tracing::info!(
            "Inventory: {} outputs, {} keypads, {} groups, {} sysvars",
            inventory.outputs.len(),
            inventory.keypads.len(),
            inventory.groups.len(),
            inventory.sysvars.len()
        );
        inventory
    }

    /// Write `inventory`
    #[allow(clippy::missing_errors_doc)]
    pub async fn save(&self, inventory: &Inventory) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(inventory).await
    }

    /// Write the snapshot `current` returns, taken once earlier saves finish
    ///
    /// Saves started in a burst therefore end with the newest state on disk.
    #[allow(clippy::missing_errors_doc)]
    pub async fn save_latest<F>(&self, current: F) -> Result<(), CoreError>
    where
        F: FnOnce() -> Inventory,
    {
        let _guard = self.write_lock.lock().await;
        let inventory = current();
        self.write(&inventory).await
    }

    async fn write(&self, inventory: &Inventory) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(inventory)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &json).await?;
        fs::rename(&staging, &self.path).await?;

        tracing::debug!(
            "Wrote {} outputs, {} keypads to {:?}",
            inventory.outputs.len(),
            inventory.keypads.len(),
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Keypad, Output, OutputKind};
    use lip_protocol::LipLedState;
    use std::sync::Arc;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lutron-core-{}-{}", name, std::process::id()))
    }

    fn outputs(count: u32) -> Inventory {
        Inventory {
            outputs: (1..=count).map(Output::new).collect(),
            ..Inventory::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = scratch_dir("roundtrip");
        let store = InventoryStore::new(dir.join("nested").join("inventory.json"));

        let mut output = Output::new(5);
        output.name = Some("Kitchen".into());
        output.kind = OutputKind::Shade;
        output.level = Some(40.0);
        let mut keypad = Keypad::new(12);
        keypad.button_mut(2).name = Some("Evening".into());
        keypad.leds.insert(82, LipLedState::NormalFlash);

        let inventory = Inventory {
            outputs: vec![output],
            keypads: vec![keypad],
            ..Inventory::default()
        };
        store.save(&inventory).await.unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());

        let loaded = store.load().await;
        assert_eq!(loaded.outputs.len(), 1);
        assert_eq!(loaded.outputs[0].kind, OutputKind::Shade);
        assert_eq!(loaded.outputs[0].level, Some(40.0));
        assert_eq!(
            loaded.keypads[0].button(2).unwrap().name.as_deref(),
            Some("Evening")
        );
        assert_eq!(
            loaded.keypads[0].leds.get(&82),
            Some(&LipLedState::NormalFlash)
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_file_is_empty() {
        let dir = scratch_dir("corrupt");
        let store = InventoryStore::new(dir.join("inventory.json"));
        assert!(store.load().await.outputs.is_empty());

        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.load().await.outputs.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_saves_keep_newest() {
        let dir = scratch_dir("overlap");
        let store = Arc::new(InventoryStore::new(dir.join("inventory.json")));

        for round in 0..50 {
            let small = tokio::spawn({
                let store = Arc::clone(&store);
                async move { store.save(&outputs(1)).await }
            });
            let large = tokio::spawn({
                let store = Arc::clone(&store);
                async move { store.save(&outputs(50)).await }
            });
            small.await.unwrap().unwrap();
            large.await.unwrap().unwrap();

            // Whichever finished last, the file is one complete snapshot
            let count = store.load().await.outputs.len();
            assert!(count == 1 || count == 50, "round {round}: {count} outputs");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_save_latest_snapshots_under_lock() {
        let dir = scratch_dir("latest");
        let store = Arc::new(InventoryStore::new(dir.join("inventory.json")));
        let known = Arc::new(std::sync::Mutex::new(0u32));

        let mut saves = Vec::new();
        for _ in 0..20 {
            *known.lock().unwrap() += 1;
            let store = Arc::clone(&store);
            let known = Arc::clone(&known);
            saves.push(tokio::spawn(async move {
                store.save_latest(|| outputs(*known.lock().unwrap())).await
            }));
        }
        for save in saves {
            save.await.unwrap().unwrap();
        }

        assert_eq!(store.load().await.outputs.len(), 20);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
