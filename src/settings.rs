use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kv_store::KeyValueStore;
use crate::md5_hex;
use crate::project::{SortBy, SortDirection};

/// Relative paths this long or longer are hashed to bound synced key size.
pub const SETTINGS_KEY_MAX_LEN: usize = 64;

pub const ROOT_DIRECTORY_KEY: &str = "root-directory";

// Persisted per-project preferences. Every field is optional on read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<SortDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_in_common: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_in_sidebar: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_line_as_title: Option<bool>,
}

impl SettingsRecord {
    /// Field-by-field decode; a malformed field is dropped without affecting the rest.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            sort_by: map
                .get("sortBy")
                .and_then(Value::as_str)
                .and_then(SortBy::from_raw),
            sort_direction: map
                .get("sortDirection")
                .and_then(Value::as_str)
                .and_then(SortDirection::from_raw),
            show_in_common: map.get("showInCommon").and_then(Value::as_bool),
            show_in_sidebar: map.get("showInSidebar").and_then(Value::as_bool),
            first_line_as_title: map.get("firstLineAsTitle").and_then(Value::as_bool),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

// ---- Location ----

/// Where a project's settings live and under which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsLocation {
    /// Synced store, keyed by the path relative to the synced root (or its hash).
    Synced(String),
    /// Local store, keyed by the absolute path.
    Local(String),
}

impl SettingsLocation {
    pub fn key(&self) -> &str {
        match self {
            SettingsLocation::Synced(key) | SettingsLocation::Local(key) => key,
        }
    }
}

/// Synced-store key for a path relative to the synced root (leading `/` kept).
pub fn settings_key(relative: &str) -> String {
    if relative.chars().count() >= SETTINGS_KEY_MAX_LEN {
        return md5_hex(relative);
    }
    if relative.is_empty() {
        return ROOT_DIRECTORY_KEY.to_string();
    }
    relative.to_string()
}

/// Pure classification of a project path into a settings location.
pub fn classify(path: &Path, synced_root: Option<&Path>) -> SettingsLocation {
    if let Some(relative) = synced_root.and_then(|root| path.strip_prefix(root).ok()) {
        let relative = relative.to_string_lossy();
        let relative = if relative.is_empty() {
            String::new()
        } else {
            format!("/{}", relative)
        };
        return SettingsLocation::Synced(settings_key(&relative));
    }

    SettingsLocation::Local(path.to_string_lossy().into_owned())
}

// ---- Backends ----

pub trait SettingsBackend {
    fn store(&self) -> &dyn KeyValueStore;
    fn save(&self, key: &str, record: &SettingsRecord) -> Result<()>;

    fn load(&self, key: &str) -> Option<SettingsRecord> {
        self.store()
            .get_dictionary(key)
            .map(|map| SettingsRecord::from_map(&map))
    }
}

/// Cross-device store. Writes are pushed with `synchronize` right away.
pub struct SyncedBackend {
    store: Arc<dyn KeyValueStore>,
}

impl SyncedBackend {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl SettingsBackend for SyncedBackend {
    fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn save(&self, key: &str, record: &SettingsRecord) -> Result<()> {
        self.store.set(key, record.to_value())?;
        self.store.synchronize()
    }
}

/// Device-local fallback for projects outside the synced root.
pub struct LocalBackend {
    store: Arc<dyn KeyValueStore>,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl SettingsBackend for LocalBackend {
    fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn save(&self, key: &str, record: &SettingsRecord) -> Result<()> {
        self.store.set(key, record.to_value())
    }
}

/// Picks the backend for a project path and loads or saves through it.
pub struct SettingsStore {
    synced_root: Option<PathBuf>,
    synced: SyncedBackend,
    local: LocalBackend,
}

impl SettingsStore {
    pub fn new(
        synced_root: Option<PathBuf>,
        synced: Arc<dyn KeyValueStore>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            synced_root,
            synced: SyncedBackend::new(synced),
            local: LocalBackend::new(local),
        }
    }

    pub fn synced_root(&self) -> Option<&Path> {
        self.synced_root.as_deref()
    }

    pub fn location(&self, path: &Path) -> SettingsLocation {
        classify(path, self.synced_root.as_deref())
    }

    pub fn backend_for(&self, location: &SettingsLocation) -> &dyn SettingsBackend {
        match location {
            SettingsLocation::Synced(_) => &self.synced,
            SettingsLocation::Local(_) => &self.local,
        }
    }

    pub fn load(&self, path: &Path) -> Option<SettingsRecord> {
        let location = self.location(path);
        self.backend_for(&location).load(location.key())
    }

    pub fn save(&self, path: &Path, record: &SettingsRecord) -> Result<()> {
        let location = self.location(path);
        tracing::debug!("Saving settings for {} under {:?}", path.display(), location);
        self.backend_for(&location).save(location.key(), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::{JsonFileStore, MemoryStore};
    use serde_json::json;

    fn store(root: Option<&str>) -> (SettingsStore, Arc<MemoryStore>, Arc<MemoryStore>) {
        let synced = Arc::new(MemoryStore::new());
        let local = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(root.map(PathBuf::from), synced.clone(), local.clone());
        (settings, synced, local)
    }

    #[test]
    fn test_classify_under_synced_root() {
        let root = Path::new("/cloud/Documents");
        assert_eq!(
            classify(Path::new("/cloud/Documents/Work"), Some(root)),
            SettingsLocation::Synced("/Work".to_string())
        );
        assert_eq!(
            classify(root, Some(root)),
            SettingsLocation::Synced(ROOT_DIRECTORY_KEY.to_string())
        );
    }

    #[test]
    fn test_classify_outside_synced_root() {
        let root = Path::new("/cloud/Documents");
        assert_eq!(
            classify(Path::new("/home/me/notes"), Some(root)),
            SettingsLocation::Local("/home/me/notes".to_string())
        );
        assert_eq!(
            classify(Path::new("/cloud/DocumentsOther"), Some(root)),
            SettingsLocation::Local("/cloud/DocumentsOther".to_string())
        );
        assert_eq!(
            classify(Path::new("/home/me/notes"), None),
            SettingsLocation::Local("/home/me/notes".to_string())
        );
    }

    #[test]
    fn test_long_relative_path_is_hashed() {
        let root = Path::new("/cloud/Documents");
        let deep = root.join("a-very-long-folder-name/with/several/levels/of/nesting/inside/it");
        let location = classify(&deep, Some(root));

        match location {
            SettingsLocation::Synced(key) => {
                assert_eq!(key.len(), 32);
                assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
            }
            other => panic!("expected synced location, got {:?}", other),
        }
    }

    #[test]
    fn test_short_key_kept_verbatim() {
        let relative = format!("/{}", "x".repeat(SETTINGS_KEY_MAX_LEN - 2));
        assert_eq!(settings_key(&relative), relative);
        let relative = format!("/{}", "x".repeat(SETTINGS_KEY_MAX_LEN));
        assert_eq!(settings_key(&relative).len(), 32);
    }

    #[test]
    fn test_record_decodes_field_by_field() {
        let value = json!({
            "sortBy": "title",
            "sortDirection": 7,
            "showInCommon": "yes",
            "showInSidebar": false
        });
        let record = SettingsRecord::from_map(value.as_object().unwrap());
        assert_eq!(record.sort_by, Some(SortBy::Title));
        assert_eq!(record.sort_direction, None);
        assert_eq!(record.show_in_common, None);
        assert_eq!(record.show_in_sidebar, Some(false));
        assert_eq!(record.first_line_as_title, None);
    }

    #[test]
    fn test_save_routes_to_matching_backend() {
        let (settings, synced, local) = store(Some("/cloud/Documents"));
        let record = SettingsRecord {
            sort_by: Some(SortBy::Title),
            sort_direction: Some(SortDirection::Asc),
            ..Default::default()
        };

        settings.save(Path::new("/cloud/Documents/Work"), &record).unwrap();
        settings.save(Path::new("/home/me/notes"), &record).unwrap();

        assert_eq!(
            synced.get("/Work"),
            Some(json!({"sortBy": "title", "sortDirection": "asc"}))
        );
        assert!(local.get("/home/me/notes").is_some());
        assert!(local.get("/Work").is_none());

        assert_eq!(settings.load(Path::new("/cloud/Documents/Work")), Some(record));
        assert_eq!(settings.load(Path::new("/cloud/Documents/Other")), None);
    }

    #[test]
    fn test_synced_save_keeps_shared_pins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synced.json");
        let settings = SettingsStore::new(
            Some(PathBuf::from("/cloud/Documents")),
            Arc::new(JsonFileStore::open(&path)),
            Arc::new(MemoryStore::new()),
        );

        let other_device = JsonFileStore::open(&path);
        other_device.set("io.notescore.pins.shared", json!(["foo.md"])).unwrap();

        let record = SettingsRecord {
            sort_by: Some(SortBy::Title),
            ..Default::default()
        };
        settings.save(Path::new("/cloud/Documents/Work"), &record).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get_string_array("io.notescore.pins.shared"),
            Some(vec!["foo.md".to_string()])
        );
        assert_eq!(settings.load(Path::new("/cloud/Documents/Work")), Some(record));
    }
}
