use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::distant_past;

/// Extensions that always qualify as notes.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "md",
    "markdown",
    "txt",
    "rtf",
    "fountain",
    "textbundle",
    "etp", // encrypted text pack
];

/// Plain-text files at or above this size are not treated as notes.
pub const MAX_TEXT_FILE_SIZE: u64 = 100_000_000;

pub const TEXT_BUNDLE_EXTENSION: &str = "textbundle";

// Extensions whose content type conforms to plain text
const TEXT_CONFORMING_EXTENSIONS: &[&str] = &[
    "text", "log", "csv", "tsv", "json", "xml", "html", "htm", "yaml", "yml", "toml", "ini",
    "cfg", "conf", "tex", "org", "rst", "adoc", "asciidoc", "textile", "wiki", "taskpaper",
    "opml", "vcf", "ics", "sh", "bash", "zsh", "py", "rb", "js", "ts", "css", "c", "h", "cpp",
    "hpp", "m", "swift", "go", "rs", "java", "kt", "php", "pl", "sql", "lua", "r",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
    Folder,
    Data,
}

/// Content type of a path as inferred from its extension and file kind.
pub fn content_type(path: &Path, is_dir: bool) -> ContentType {
    if is_dir {
        return ContentType::Folder;
    }

    match extension_of(path) {
        Some(ext) if TEXT_CONFORMING_EXTENSIONS.contains(&ext.as_str()) => ContentType::PlainText,
        _ => ContentType::Data,
    }
}

/// One directory entry that qualifies as a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl ScannedEntry {
    pub fn is_text_bundle(&self) -> bool {
        is_text_bundle(&self.path)
    }
}

pub fn is_text_bundle(path: &Path) -> bool {
    extension_of(path).as_deref() == Some(TEXT_BUNDLE_EXTENSION)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Whether a directory entry with the given metadata is a valid note.
pub fn is_note_candidate(path: &Path, metadata: &Metadata) -> bool {
    if is_hidden(path) {
        return false;
    }

    let is_dir = metadata.is_dir();
    let allowed = extension_of(path)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);

    if allowed {
        // Only bundles stand in for a note as a directory
        return !is_dir || is_text_bundle(path);
    }

    metadata.len() < MAX_TEXT_FILE_SIZE && content_type(path, is_dir) == ContentType::PlainText
}

fn resolve_time(time: std::io::Result<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_else(|_| distant_past())
}

/// List the notes directly inside `dir`, sorted by path.
///
/// An unreadable directory yields an empty list; the failure is only logged.
pub fn scan_directory(dir: &Path) -> Vec<ScannedEntry> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Storage not found, path: {} - {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut notes: Vec<ScannedEntry> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            // Follow symlinks so linked notes report their target's metadata
            let metadata = std::fs::metadata(&path).or_else(|_| entry.metadata()).ok()?;
            if !is_note_candidate(&path, &metadata) {
                return None;
            }

            Some(ScannedEntry {
                modified: resolve_time(metadata.modified()),
                created: resolve_time(metadata.created()),
                path,
            })
        })
        .collect();

    notes.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Scanned {} notes in {}", notes.len(), dir.display());
    notes
}
