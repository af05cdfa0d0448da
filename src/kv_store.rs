use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A small persisted string-keyed map of JSON values.
///
/// Both the cross-device synced store and the device-local store implement
/// this. `synchronize` pulls in changes written by other processes or
/// devices; for the file store that means re-reading the backing file.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn get_dictionary(&self, key: &str) -> Option<Map<String, Value>> {
        match self.get(key) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key) {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

// ---- JSON file store ----

/// Key-value store backed by one JSON object on disk, rewritten on every write.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write store {}", self.path.display()))?;
        Ok(())
    }
}

// Missing or unreadable store files are treated as empty
fn read_entries(path: &Path) -> Map<String, Value> {
    if !path.exists() {
        return Map::new();
    }

    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str::<Map<String, Value>>(&content).map_err(Into::into))
    {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Ignoring unreadable store {}: {}", path.display(), e);
            Map::new()
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .expect("store read lock")
            .get(key)
            .cloned()
    }

    // Writes merge into the file's current contents so keys written by
    // other handles survive. Memory is swapped only once the file is written.
    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().expect("store write lock");
        let mut fresh = read_entries(&self.path);
        fresh.insert(key.to_string(), value);
        self.persist(&fresh)?;
        *entries = fresh;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().expect("store write lock");
        let mut fresh = read_entries(&self.path);
        if fresh.remove(key).is_some() {
            self.persist(&fresh)?;
        }
        *entries = fresh;
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        let fresh = read_entries(&self.path);
        *self.entries.write().expect("store write lock") = fresh;
        Ok(())
    }
}

// ---- In-memory store ----

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .expect("store read lock")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries
            .write()
            .expect("store write lock")
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().expect("store write lock").remove(key);
        Ok(())
    }
}
