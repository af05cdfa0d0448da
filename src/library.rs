// Arena of projects. Parents are linked by ProjectId index, never by reference.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::Config;
use crate::kv_store::{JsonFileStore, KeyValueStore};
use crate::meta_cache::MetaCache;
use crate::note::Note;
use crate::pins::PinSync;
use crate::project::{Project, ProjectOptions, IMAGES_DIR};
use crate::settings::SettingsStore;
use crate::{scanner, standardize_path};

// Attachment folders that never become child projects
const ASSET_DIRS: &[&str] = &[IMAGES_DIR, "files", "assets"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub usize);

pub struct Library {
    config: Config,
    settings: SettingsStore,
    meta_cache: MetaCache,
    pins: PinSync,
    projects: Vec<Project>,
}

impl Library {
    /// Library backed by the JSON file stores named in `config`.
    pub fn open(config: Config) -> Self {
        let synced: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&config.synced_store_path));
        let local: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&config.local_store_path));
        Self::with_stores(config, synced, local)
    }

    pub fn with_stores(
        config: Config,
        synced: Arc<dyn KeyValueStore>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        let settings = SettingsStore::new(config.synced_root.clone(), synced.clone(), local);
        let meta_cache = MetaCache::new(config.caches_dir.clone());
        let pins = PinSync::new(synced, config.pins_key());

        Self {
            config,
            settings,
            meta_cache,
            pins,
            projects: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn meta_cache(&self) -> &MetaCache {
        &self.meta_cache
    }

    pub fn pins(&self) -> &PinSync {
        &self.pins
    }

    // ---- Arena ----

    /// Register a project, loading its settings and (when enabled) its cache.
    /// A path that is already registered returns the existing id.
    pub fn add_project(&mut self, path: &Path, options: ProjectOptions) -> Result<ProjectId> {
        let path = standardize_path(path);
        if let Some(existing) = self.find(&path) {
            return Ok(existing);
        }
        if let Some(parent) = options.parent {
            if parent.0 >= self.projects.len() {
                bail!("Unknown parent project {:?} for {}", parent, path.display());
            }
        }

        let id = ProjectId(self.projects.len());
        let mut project = Project::new(id, &path, options, &self.config);
        project.load_settings(&self.settings, &self.config.defaults);
        project.load_cache(&self.meta_cache);

        tracing::debug!("Added project {} as {:?}", path.display(), id);
        self.projects.push(project);
        Ok(id)
    }

    pub fn find(&self, path: &Path) -> Option<ProjectId> {
        let path = standardize_path(path);
        self.projects
            .iter()
            .find(|p| p.path() == path)
            .map(Project::id)
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(id.0)
    }

    pub fn project_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.projects.get_mut(id.0)
    }

    fn get(&self, id: ProjectId) -> Result<&Project> {
        self.project(id)
            .ok_or_else(|| anyhow!("Unknown project {:?}", id))
    }

    fn get_mut(&mut self, id: ProjectId) -> Result<&mut Project> {
        self.projects
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("Unknown project {:?}", id))
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn parent(&self, id: ProjectId) -> Option<&Project> {
        self.project(id)?.parent().and_then(|p| self.project(p))
    }

    pub fn children(&self, id: ProjectId) -> Vec<ProjectId> {
        self.projects
            .iter()
            .filter(|p| p.parent() == Some(id))
            .map(Project::id)
            .collect()
    }

    /// Top of the tree: a root returns itself, otherwise climb parents.
    pub fn root_of(&self, id: ProjectId) -> ProjectId {
        let mut current = id;
        // Parents always have lower ids, so this terminates
        while let Some(project) = self.project(current) {
            if project.is_root {
                break;
            }
            match project.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    pub fn full_label(&self, id: ProjectId) -> String {
        let Some(project) = self.project(id) else {
            return String::new();
        };

        if project.is_root {
            if project.is_external {
                return format!("External › {}", project.label);
            }
            return project.label.clone();
        }

        if project.is_trash {
            return "Trash".to_string();
        }

        if project.is_archive {
            return project.label.clone();
        }

        let root = self.root_of(id);
        if root == id {
            return project.label.clone();
        }
        format!("{} › {}", self.full_label(root), project.label)
    }

    /// Path relative to the root project, for version-control operations.
    pub fn git_path(&self, id: ProjectId) -> Option<String> {
        let project = self.project(id)?;
        if project.is_archive || project.parent().is_none() {
            return None;
        }

        let root = self.project(self.root_of(id))?;
        let relative = project.path().strip_prefix(root.path()).ok()?;
        let relative = relative.to_string_lossy().trim_start_matches('/').to_string();
        if relative.is_empty() {
            None
        } else {
            Some(relative)
        }
    }

    /// First four hex characters of the root project's path hash.
    pub fn short_sign(&self, id: ProjectId) -> String {
        self.project(self.root_of(id))
            .map(|root| root.md5_hash().chars().take(4).collect())
            .unwrap_or_default()
    }

    /// Register every visible subdirectory of `root` as a child project.
    pub fn discover(&mut self, root: ProjectId, max_depth: usize) -> Result<Vec<ProjectId>> {
        let root_path = self.get(root)?.path().to_path_buf();
        let mut added = Vec::new();

        let walker = WalkDir::new(&root_path)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.file_type().is_dir()
                    && !name.starts_with('.')
                    && !ASSET_DIRS.iter().any(|dir| name == *dir)
                    && !scanner::is_text_bundle(entry.path())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root_path.display(), e);
                    continue;
                }
            };

            let parent = entry
                .path()
                .parent()
                .and_then(|p| self.find(p))
                .unwrap_or(root);
            let id = self.add_project(entry.path(), ProjectOptions::child_of(parent))?;
            added.push(id);
        }

        tracing::info!("Discovered {} projects under {}", added.len(), root_path.display());
        Ok(added)
    }

    // ---- Notes and settings ----

    pub fn notes(&mut self, id: ProjectId) -> Result<Vec<Note>> {
        let pins = &self.pins;
        let project = self
            .projects
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("Unknown project {:?}", id))?;
        Ok(project.get_notes(pins))
    }

    pub fn load_settings(&mut self, id: ProjectId) -> Result<()> {
        let project = self
            .projects
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("Unknown project {:?}", id))?;
        project.load_settings(&self.settings, &self.config.defaults);
        Ok(())
    }

    pub fn save_settings(&self, id: ProjectId) -> Result<()> {
        self.get(id)?.save_settings(&self.settings)
    }

    pub fn save_cache(&mut self, id: ProjectId, notes: &[Note]) -> Result<()> {
        let project = self
            .projects
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("Unknown project {:?}", id))?;
        project.save_cache(&self.meta_cache, notes)
    }

    /// Forget the cached listing in memory and on disk.
    pub fn clear_cache(&mut self, id: ProjectId) -> Result<()> {
        let project = self.get_mut(id)?;
        project.invalidate_cache();
        let path = project.path().to_path_buf();
        self.meta_cache.remove(&path)
    }

    /// Move a note's file into another project and make that project its owner.
    /// Both projects drop their cached listings.
    pub fn move_note(&mut self, note: &mut Note, destination: ProjectId) -> Result<()> {
        let source = note.project;
        let target_dir = self.get(destination)?.path();
        let target: PathBuf = target_dir.join(&note.name);
        if target.exists() {
            bail!("{} already exists", target.display());
        }

        std::fs::rename(&note.path, &target).with_context(|| {
            format!("Failed to move {} to {}", note.path.display(), target.display())
        })?;

        note.path = target;
        note.project = destination;
        for id in [source, destination] {
            if let Some(project) = self.project_mut(id) {
                project.invalidate_cache();
            }
        }
        Ok(())
    }
}
