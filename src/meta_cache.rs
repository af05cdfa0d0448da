use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::md5_hex;

pub const CACHE_SUFFIX: &str = "cache";

// Note metadata for list display, persisted so a project can be listed without reading files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    /// File name including extension, e.g. `foo.md`.
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
}

/// On-disk metadata cache, one file per project.
#[derive(Debug, Clone)]
pub struct MetaCache {
    caches_dir: PathBuf,
}

impl MetaCache {
    pub fn new(caches_dir: impl Into<PathBuf>) -> Self {
        Self {
            caches_dir: caches_dir.into(),
        }
    }

    pub fn cache_key(project_path: &Path) -> String {
        md5_hex(&project_path.to_string_lossy())
    }

    pub fn cache_path(&self, project_path: &Path) -> PathBuf {
        self.caches_dir
            .join(format!("{}.{}", Self::cache_key(project_path), CACHE_SUFFIX))
    }

    /// Read the cached list for a project. Missing or undecodable caches are empty.
    pub fn load(&self, project_path: &Path) -> Vec<NoteMeta> {
        let path = self.cache_path(project_path);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("No meta cache at {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<NoteMeta>>(&data) {
            Ok(metas) => metas,
            Err(e) => {
                tracing::warn!("Discarding unreadable meta cache {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, project_path: &Path, metas: &[NoteMeta]) -> Result<()> {
        std::fs::create_dir_all(&self.caches_dir)
            .with_context(|| format!("Failed to create {}", self.caches_dir.display()))?;

        let path = self.cache_path(project_path);
        let data = serde_json::to_vec(metas)?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write meta cache {}", path.display()))?;
        Ok(())
    }

    pub fn remove(&self, project_path: &Path) -> Result<()> {
        let path = self.cache_path(project_path);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove meta cache {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<NoteMeta> {
        vec![
            NoteMeta {
                name: "foo.md".to_string(),
                title: "Foo".to_string(),
                preview: "first line".to_string(),
                modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                created: Utc.with_ymd_and_hms(2023, 1, 1, 8, 30, 0).unwrap(),
                tags: vec!["work".to_string()],
                pinned: true,
            },
            NoteMeta {
                name: "bar.txt".to_string(),
                title: "bar".to_string(),
                preview: String::new(),
                modified: crate::distant_past(),
                created: crate::distant_past(),
                tags: vec![],
                pinned: false,
            },
        ]
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetaCache::new(dir.path().join("caches"));
        let project = Path::new("/notes/Inbox");

        cache.save(project, &sample()).unwrap();
        assert_eq!(cache.load(project), sample());
    }

    #[test]
    fn test_corrupt_cache_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetaCache::new(dir.path());
        let project = Path::new("/notes/Inbox");

        cache.save(project, &sample()).unwrap();
        std::fs::write(cache.cache_path(project), b"\x00garbage{").unwrap();
        assert!(cache.load(project).is_empty());
    }

    #[test]
    fn test_missing_cache_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetaCache::new(dir.path());
        assert!(cache.load(Path::new("/never/cached")).is_empty());
    }

    #[test]
    fn test_cache_file_named_by_path_hash() {
        let cache = MetaCache::new("/tmp/caches");
        let path = cache.cache_path(Path::new("/notes/Inbox"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.ends_with(".cache"));
        let stem = name.trim_end_matches(".cache");
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, md5_hex("/notes/Inbox"));
    }

    #[test]
    fn test_remove_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetaCache::new(dir.path());
        let project = Path::new("/notes/Inbox");
        cache.save(project, &sample()).unwrap();
        cache.remove(project).unwrap();
        assert!(!cache.cache_path(project).exists());
        cache.remove(project).unwrap();
    }
}
