use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::library::ProjectId;
use crate::meta_cache::NoteMeta;
use crate::project::{SortBy, SortDirection};
use crate::scanner::{self, ScannedEntry};

// Extensions whose content is not plain text and is never parsed
const OPAQUE_EXTENSIONS: &[&str] = &["rtf", "etp"];

// Full note, hydrated from disk or from cached metadata
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub name: String,
    pub path: PathBuf,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub pinned: bool,
    pub project: ProjectId,
}

impl Note {
    /// Slow path: read the file to derive title, preview and tags.
    pub fn from_entry(entry: &ScannedEntry, project: ProjectId, first_line_as_title: bool) -> Self {
        let path = entry.path.clone();
        let name = file_name(&path);
        let content = read_content(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to read note {}: {}", path.display(), e);
            String::new()
        });
        let (front, body) = parse_frontmatter(&content);

        let title = match front.title {
            Some(t) if !is_effectively_empty(&t) => t.trim().to_string(),
            _ if first_line_as_title && !body.trim().is_empty() => extract_title(&body),
            _ => file_stem(&path),
        };

        let preview = if first_line_as_title {
            generate_preview(&body)
        } else {
            first_text_line(&body)
        };

        let mut tags = front.tags;
        for tag in extract_inline_tags(&body) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Self {
            name,
            path,
            title,
            preview,
            tags,
            modified: entry.modified,
            created: entry.created,
            pinned: false,
            project,
        }
    }

    /// Fast path: no filesystem access.
    pub fn from_meta(meta: &NoteMeta, project_dir: &Path, project: ProjectId) -> Self {
        Self {
            name: meta.name.clone(),
            path: project_dir.join(&meta.name),
            title: meta.title.clone(),
            preview: meta.preview.clone(),
            tags: meta.tags.clone(),
            modified: meta.modified,
            created: meta.created,
            pinned: meta.pinned,
            project,
        }
    }

    pub fn to_meta(&self) -> NoteMeta {
        NoteMeta {
            name: self.name.clone(),
            title: self.title.clone(),
            preview: self.preview.clone(),
            modified: self.modified,
            created: self.created,
            tags: self.tags.clone(),
            pinned: self.pinned,
        }
    }

    pub fn is_text_bundle(&self) -> bool {
        scanner::is_text_bundle(&self.path)
    }

    /// A bundle is fully loaded once its `text.*` content file is present locally.
    pub fn is_fully_loaded_text_bundle(&self) -> bool {
        text_bundle_content_path(&self.path).is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        extension(&self.path).as_deref() == Some("etp")
    }

    /// Read the full note text. Bundles read their inner content file.
    pub fn content(&self) -> Result<String> {
        read_content(&self.path)
            .with_context(|| format!("Failed to read note {}", self.path.display()))
    }
}

// ---- Sorting ----

/// Pinned notes first, then by the given field and direction; name breaks ties.
pub fn sort_notes(notes: &mut [Note], sort_by: SortBy, direction: SortDirection) {
    notes.sort_by(|a, b| {
        b.pinned.cmp(&a.pinned).then_with(|| {
            let ord = match sort_by {
                SortBy::ModificationDate => a.modified.cmp(&b.modified),
                SortBy::CreationDate => a.created.cmp(&b.created),
                SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                SortBy::None => Ordering::Equal,
            };
            let ord = match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            ord.then_with(|| a.name.cmp(&b.name))
        })
    });
}

// ---- Content helpers ----

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn text_bundle_content_path(bundle: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(bundle)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.file_stem().map_or(false, |s| s == "text"))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn read_content(path: &Path) -> std::io::Result<String> {
    if scanner::is_text_bundle(path) {
        return match text_bundle_content_path(path) {
            Some(inner) => std::fs::read_to_string(inner),
            None => Ok(String::new()),
        };
    }

    if extension(path).map_or(false, |e| OPAQUE_EXTENSIONS.contains(&e.as_str())) {
        return Ok(String::new());
    }

    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// Check if a string is effectively empty
fn is_effectively_empty(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_whitespace() || c == '\u{00A0}' || c == '\u{FEFF}')
}

// Extract title from the first meaningful line
pub fn extract_title(content: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("# ") {
            let title = title.trim();
            if !is_effectively_empty(title) {
                return title.to_string();
            }
        }
        if !is_effectively_empty(trimmed) {
            return trimmed.chars().take(50).collect();
        }
    }
    "Untitled".to_string()
}

// Preview is the first text line after the title line
pub fn generate_preview(content: &str) -> String {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !is_effectively_empty(l));
    lines.next();
    lines
        .find(|l| !l.starts_with('#'))
        .map(|l| l.chars().take(100).collect())
        .unwrap_or_default()
}

fn first_text_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|l| !is_effectively_empty(l) && !l.starts_with('#'))
        .map(|l| l.chars().take(100).collect())
        .unwrap_or_default()
}

// ---- Front matter ----

#[derive(Debug, Default, PartialEq)]
struct FrontMatter {
    title: Option<String>,
    tags: Vec<String>,
}

/// Split optional YAML front matter from the body. Malformed front matter is left in the body.
fn parse_frontmatter(content: &str) -> (FrontMatter, String) {
    let trimmed = content.trim_start_matches('\u{FEFF}');
    let Some(after_first) = trimmed.strip_prefix("---") else {
        return (FrontMatter::default(), content.to_string());
    };
    let Some(close_pos) = after_first.find("\n---") else {
        return (FrontMatter::default(), content.to_string());
    };

    let yaml_str = &after_first[..close_pos];
    let value: serde_yaml::Value = match serde_yaml::from_str(yaml_str) {
        Ok(v) => v,
        Err(_) => return (FrontMatter::default(), content.to_string()),
    };

    let body_start = close_pos + 4; // skip \n---
    let body = after_first
        .get(body_start..)
        .unwrap_or_default()
        .trim_start_matches(&['-', '\r'][..])
        .trim_start_matches('\n')
        .to_string();

    let title = value
        .get("title")
        .and_then(|t| t.as_str())
        .map(str::to_string);

    let tags = match value.get("tags") {
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(|t| t.as_str())
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(serde_yaml::Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    (FrontMatter { title, tags }, body)
}

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)#([\p{L}\p{N}_][\p{L}\p{N}_/\-]*)").expect("valid tag pattern")
    })
}

/// Inline `#tags`, in first-seen order. Fenced code blocks are ignored.
pub fn extract_inline_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut in_fence = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        for caps in tag_regex().captures_iter(line) {
            let tag = caps[1].trim_end_matches('/').to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distant_past;

    fn entry(path: PathBuf) -> ScannedEntry {
        ScannedEntry {
            path,
            modified: distant_past(),
            created: distant_past(),
        }
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title("# Hello\n\nbody"), "Hello");
        assert_eq!(extract_title("\n\nplain first line\nmore"), "plain first line");
        assert_eq!(extract_title("   \n"), "Untitled");
    }

    #[test]
    fn test_generate_preview() {
        assert_eq!(generate_preview("# Title\n\n## Sub\nThe body."), "The body.");
        assert_eq!(generate_preview("# Title only"), "");
    }

    #[test]
    fn test_inline_tags() {
        let content = "# Heading\nSome #work and #home/garden.\n```\n#not-a-tag\n```\nend #work";
        assert_eq!(extract_inline_tags(content), vec!["work", "home/garden"]);
    }

    #[test]
    fn test_frontmatter_title_and_tags() {
        let content = "---\ntitle: Groceries\ntags: [food, errands]\n---\nmilk #urgent\n";
        let (front, body) = parse_frontmatter(content);
        assert_eq!(front.title.as_deref(), Some("Groceries"));
        assert_eq!(front.tags, vec!["food", "errands"]);
        assert_eq!(body, "milk #urgent\n");
    }

    #[test]
    fn test_from_entry_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.md");
        std::fs::write(&path, "---\ntags: trip\n---\n# Plan\nPack bags #travel\n").unwrap();

        let note = Note::from_entry(&entry(path.clone()), ProjectId(0), true);
        assert_eq!(note.name, "plan.md");
        assert_eq!(note.title, "Plan");
        assert_eq!(note.preview, "Pack bags #travel");
        assert_eq!(note.tags, vec!["trip", "travel"]);
        assert!(!note.pinned);

        let by_name = Note::from_entry(&entry(path), ProjectId(0), false);
        assert_eq!(by_name.title, "plan");
    }

    #[test]
    fn test_text_bundle_content() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("trip.textbundle");
        std::fs::create_dir(&bundle).unwrap();

        let note = Note::from_entry(&entry(bundle.clone()), ProjectId(0), true);
        assert!(note.is_text_bundle());
        assert!(!note.is_fully_loaded_text_bundle());

        std::fs::write(bundle.join("text.markdown"), "# Trip\nDay one").unwrap();
        let note = Note::from_entry(&entry(bundle), ProjectId(0), true);
        assert!(note.is_fully_loaded_text_bundle());
        assert_eq!(note.title, "Trip");
        assert_eq!(note.content().unwrap(), "# Trip\nDay one");
    }

    #[test]
    fn test_encrypted_notes_are_not_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.etp");
        std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let note = Note::from_entry(&entry(path), ProjectId(0), true);
        assert!(note.is_encrypted());
        assert_eq!(note.title, "secret");
        assert!(note.tags.is_empty());
    }

    #[test]
    fn test_meta_round_trip_keeps_pin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "# A").unwrap();

        let mut note = Note::from_entry(&entry(path), ProjectId(3), true);
        note.pinned = true;
        let back = Note::from_meta(&note.to_meta(), dir.path(), ProjectId(3));
        assert_eq!(back.path, note.path);
        assert!(back.pinned);
        assert_eq!(back.project, ProjectId(3));
    }

    #[test]
    fn test_sort_pinned_first_then_title() {
        let mk = |name: &str, title: &str, pinned: bool| Note {
            name: name.to_string(),
            path: PathBuf::from(name),
            title: title.to_string(),
            preview: String::new(),
            tags: vec![],
            modified: distant_past(),
            created: distant_past(),
            pinned,
            project: ProjectId(0),
        };
        let mut notes = vec![mk("b.md", "beta", false), mk("c.md", "Charlie", true), mk("a.md", "Alpha", false)];

        sort_notes(&mut notes, SortBy::Title, SortDirection::Asc);
        let order: Vec<&str> = notes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["c.md", "a.md", "b.md"]);

        sort_notes(&mut notes, SortBy::Title, SortDirection::Desc);
        let order: Vec<&str> = notes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["c.md", "b.md", "a.md"]);
    }
}
