use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, Defaults};
use crate::library::ProjectId;
use crate::meta_cache::{MetaCache, NoteMeta};
use crate::note::{self, Note};
use crate::pins::PinSync;
use crate::scanner;
use crate::settings::{SettingsRecord, SettingsStore};
use crate::{md5_hex, standardize_path};

/// Unconfigured projects with this label sort alphabetically.
pub const WELCOME_LABEL: &str = "Welcome";

/// Subdirectory holding a project's attached images.
pub const IMAGES_DIR: &str = "i";

// ---- Sort Enums ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    None,
    ModificationDate,
    CreationDate,
    Title,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::None => "none",
            SortBy::ModificationDate => "modificationDate",
            SortBy::CreationDate => "creationDate",
            SortBy::Title => "title",
        }
    }

    pub fn from_raw(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SortBy::None),
            "modificationDate" => Some(SortBy::ModificationDate),
            "creationDate" => Some(SortBy::CreationDate),
            "title" => Some(SortBy::Title),
            _ => None,
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn from_raw(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---- Cache State ----

/// Where the project's current note set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing cached; the next listing scans the directory.
    Uncached,
    /// A non-empty metadata cache is loaded and will be served as-is.
    Cached(Vec<NoteMeta>),
    /// The last listing came from the live filesystem.
    Scanned,
}

// ---- Project ----

#[derive(Debug, Clone)]
pub struct ProjectOptions {
    pub label: Option<String>,
    pub is_trash: bool,
    pub is_root: bool,
    pub parent: Option<ProjectId>,
    pub is_default: bool,
    pub is_archive: bool,
    pub is_external: bool,
    /// Serve listings from the metadata cache when one is available.
    pub cache: bool,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            label: None,
            is_trash: false,
            is_root: false,
            parent: None,
            is_default: false,
            is_archive: false,
            is_external: false,
            cache: true,
        }
    }
}

impl ProjectOptions {
    pub fn root() -> Self {
        Self {
            is_root: true,
            ..Self::default()
        }
    }

    pub fn child_of(parent: ProjectId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }
}

/// A directory treated as one note collection.
#[derive(Debug, Clone)]
pub struct Project {
    id: ProjectId,
    path: PathBuf,
    parent: Option<ProjectId>,
    pub label: String,
    pub is_trash: bool,
    pub is_archive: bool,
    pub is_root: bool,
    pub is_default: bool,
    pub is_external: bool,
    pub is_cloud_synced: bool,

    pub sort_by: SortBy,
    pub sort_direction: SortDirection,
    pub sort_by_settings: SortBy,
    pub sort_direction_settings: SortDirection,

    pub show_in_common: bool,
    pub show_in_sidebar: bool,
    pub first_line_as_title: bool,

    use_cache: bool,
    cache: CacheState,
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Project {}

impl Project {
    /// Build a project with defaults applied; settings and cache are not loaded yet.
    pub fn new(id: ProjectId, path: &Path, options: ProjectOptions, config: &Config) -> Self {
        let path = standardize_path(path);
        let defaults = &config.defaults;

        let label = options.label.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string())
        });

        let is_cloud_synced = config
            .synced_root
            .as_deref()
            .map(|root| root.exists() && path.starts_with(root))
            .unwrap_or(false);

        let show_in_sidebar =
            !(defaults.hide_default_root_in_sidebar && options.is_root && options.is_default);

        Self {
            id,
            parent: options.parent,
            label,
            is_trash: options.is_trash,
            is_archive: options.is_archive,
            is_root: options.is_root,
            is_default: options.is_default,
            is_external: options.is_external,
            is_cloud_synced,
            sort_by: defaults.sort_by,
            sort_direction: defaults.sort_direction,
            sort_by_settings: SortBy::None,
            sort_direction_settings: SortDirection::Desc,
            show_in_common: !(options.is_trash || options.is_archive),
            show_in_sidebar,
            first_line_as_title: defaults.first_line_as_title,
            use_cache: options.cache,
            cache: CacheState::Uncached,
            path,
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parent(&self) -> Option<ProjectId> {
        self.parent
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    pub fn cache_state(&self) -> &CacheState {
        &self.cache
    }

    pub fn md5_hash(&self) -> String {
        md5_hex(&self.path.to_string_lossy())
    }

    /// Change the sort and remember it as this project's persisted override.
    pub fn set_sort(&mut self, sort_by: SortBy, direction: SortDirection) {
        self.sort_by = sort_by;
        self.sort_direction = direction;
        self.sort_by_settings = sort_by;
        self.sort_direction_settings = direction;
    }

    // ---- Settings ----

    pub fn load_settings(&mut self, store: &SettingsStore, defaults: &Defaults) {
        let record = store.load(&self.path);
        self.apply_settings(record, defaults);
    }

    /// Apply a stored record on top of the current state. Absent fields keep their values.
    pub fn apply_settings(&mut self, record: Option<SettingsRecord>, defaults: &Defaults) {
        let Some(record) = record else {
            self.first_line_as_title = defaults.first_line_as_title;
            if self.label == WELCOME_LABEL {
                self.sort_by = SortBy::Title;
                self.sort_direction = SortDirection::Asc;
            }
            return;
        };

        if let Some(common) = record.show_in_common {
            self.show_in_common = common;
        }

        if let Some(sidebar) = record.show_in_sidebar {
            self.show_in_sidebar = sidebar;
        }

        if let Some(sort) = record.sort_by.filter(|s| *s != SortBy::None) {
            self.sort_by = sort;
            self.sort_by_settings = sort;

            if let Some(direction) = record.sort_direction {
                self.sort_direction = direction;
                self.sort_direction_settings = direction;
            }
        }

        // Root projects always follow the platform title mode
        self.first_line_as_title = if self.is_root {
            defaults.first_line_as_title
        } else {
            record
                .first_line_as_title
                .unwrap_or(defaults.first_line_as_title)
        };
    }

    /// The persisted subset of state, not the effective merged values.
    pub fn settings_record(&self) -> SettingsRecord {
        SettingsRecord {
            sort_by: Some(self.sort_by_settings),
            sort_direction: Some(self.sort_direction_settings),
            show_in_common: Some(self.show_in_common),
            show_in_sidebar: Some(self.show_in_sidebar),
            first_line_as_title: Some(self.first_line_as_title),
        }
    }

    pub fn save_settings(&self, store: &SettingsStore) -> Result<()> {
        store
            .save(&self.path, &self.settings_record())
            .with_context(|| format!("Failed to save settings for {}", self.path.display()))
    }

    // ---- Cache ----

    pub fn load_cache(&mut self, cache: &MetaCache) {
        if !self.use_cache {
            return;
        }

        let metas = cache.load(&self.path);
        self.cache = if metas.is_empty() {
            CacheState::Uncached
        } else {
            tracing::debug!("Loaded {} cached notes for {}", metas.len(), self.path.display());
            CacheState::Cached(metas)
        };
    }

    pub fn save_cache(&mut self, cache: &MetaCache, notes: &[Note]) -> Result<()> {
        let metas: Vec<NoteMeta> = notes
            .iter()
            .filter(|n| n.project == self.id)
            .map(Note::to_meta)
            .collect();
        cache.save(&self.path, &metas)?;

        if self.use_cache && !metas.is_empty() {
            self.cache = CacheState::Cached(metas);
        }
        Ok(())
    }

    /// Drop the in-memory cache so the next listing rescans.
    pub fn invalidate_cache(&mut self) {
        self.cache = CacheState::Uncached;
    }

    // ---- Notes ----

    /// Scan the directory and hydrate every note found.
    pub fn read(&self) -> Vec<Note> {
        scanner::scan_directory(&self.path)
            .iter()
            .map(|entry| Note::from_entry(entry, self.id, self.first_line_as_title))
            .filter(|note| !note.is_text_bundle() || note.is_fully_loaded_text_bundle())
            .collect()
    }

    /// Current note set: the cache when enabled and loaded, otherwise a fresh scan with pins applied.
    pub fn get_notes(&mut self, pins: &PinSync) -> Vec<Note> {
        if self.use_cache {
            if let CacheState::Cached(metas) = &self.cache {
                return metas
                    .iter()
                    .map(|meta| Note::from_meta(meta, &self.path, self.id))
                    .collect();
            }
        }

        let mut notes = self.read();
        pins.apply(&mut notes);
        self.cache = CacheState::Scanned;
        notes
    }

    pub fn sort_notes(&self, notes: &mut [Note]) {
        note::sort_notes(notes, self.sort_by, self.sort_direction);
    }

    /// Unique tags across this project's notes, in first-seen order.
    pub fn all_tags(&self, notes: &[Note]) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for note in notes.iter().filter(|n| n.project == self.id) {
            for tag in &note.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    // ---- Filesystem ----

    pub fn file_exists(&self, file_name: &str, ext: &str) -> bool {
        self.path.join(format!("{}.{}", file_name, ext)).exists()
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("Failed to create project {}", self.path.display()))
    }

    pub fn create_image_dir(&self) -> Result<()> {
        let dir = self.path.join(IMAGES_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))
    }

    pub fn remove(&self) -> Result<()> {
        std::fs::remove_dir_all(&self.path)
            .with_context(|| format!("Failed to remove project {}", self.path.display()))
    }
}
