use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::project::{SortBy, SortDirection};

// Platform-wide defaults applied before any per-project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Defaults {
    pub sort_by: SortBy,
    pub sort_direction: SortDirection,
    pub first_line_as_title: bool,
    /// Mobile layout hides the default root project from the sidebar.
    pub hide_default_root_in_sidebar: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            sort_by: SortBy::ModificationDate,
            sort_direction: SortDirection::Desc,
            first_line_as_title: false,
            hide_default_root_in_sidebar: false,
        }
    }
}

// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory holding `<md5>.cache` files.
    pub caches_dir: PathBuf,
    /// Root of the cross-device synced documents folder, if one is available.
    pub synced_root: Option<PathBuf>,
    /// Backing file of the synced key-value store.
    pub synced_store_path: PathBuf,
    /// Backing file of the local key-value store.
    pub local_store_path: PathBuf,
    /// Reverse-domain identifier used to namespace shared keys.
    pub app_id: String,
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        let caches = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("notes-core");
        let data = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("notes-core");

        Self {
            caches_dir: caches,
            synced_root: None,
            synced_store_path: data.join("synced-store.json"),
            local_store_path: data.join("local-store.json"),
            app_id: "io.notescore".to_string(),
            defaults: Defaults::default(),
        }
    }
}

impl Config {
    /// Config rooted in a single directory. Used by the CLI and tests.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            caches_dir: dir.join("caches"),
            synced_root: None,
            synced_store_path: dir.join("synced-store.json"),
            local_store_path: dir.join("local-store.json"),
            ..Self::default()
        }
    }

    /// Key of the shared pin list in the synced store.
    pub fn pins_key(&self) -> String {
        format!("{}.pins.shared", self.app_id)
    }

    // Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str::<Config>(&content).map_err(anyhow::Error::from))
        {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}
