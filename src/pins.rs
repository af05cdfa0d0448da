use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::kv_store::KeyValueStore;
use crate::note::Note;

/// Pinned note names shared across devices through the synced store.
pub struct PinSync {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl PinSync {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current shared list. A missing or malformed entry reads as empty.
    pub fn names(&self) -> Vec<String> {
        if let Err(e) = self.store.synchronize() {
            tracing::warn!("Failed to synchronize pin store: {}", e);
        }
        self.store.get_string_array(&self.key).unwrap_or_default()
    }

    /// Mark every note whose name appears in the shared list. Unknown names are ignored.
    pub fn apply(&self, notes: &mut [Note]) {
        for name in self.names() {
            if let Some(note) = notes.iter_mut().find(|n| n.name == name) {
                note.pinned = true;
            }
        }
    }

    pub fn pin(&self, name: &str) -> Result<()> {
        let mut names = self.names();
        if names.iter().any(|n| n == name) {
            return Ok(());
        }
        names.push(name.to_string());
        self.write(names)
    }

    pub fn unpin(&self, name: &str) -> Result<()> {
        let mut names = self.names();
        let before = names.len();
        names.retain(|n| n != name);
        if names.len() == before {
            return Ok(());
        }
        self.write(names)
    }

    fn write(&self, names: Vec<String>) -> Result<()> {
        let value = Value::Array(names.into_iter().map(Value::String).collect());
        self.store.set(&self.key, value)?;
        self.store.synchronize()
    }
}
