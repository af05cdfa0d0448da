pub mod config;
pub mod kv_store;
pub mod library;
pub mod logging;
pub mod meta_cache;
pub mod note;
pub mod pins;
pub mod project;
pub mod scanner;
pub mod settings;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use md5::{Digest, Md5};
use std::path::{Component, Path, PathBuf};

pub use config::{Config, Defaults};
pub use kv_store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use library::{Library, ProjectId};
pub use meta_cache::{MetaCache, NoteMeta};
pub use note::Note;
pub use pins::PinSync;
pub use project::{CacheState, Project, ProjectOptions, SortBy, SortDirection};
pub use settings::{SettingsBackend, SettingsLocation, SettingsRecord, SettingsStore};

// Utility: lowercase hex MD5 of a string
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

// Utility: stand-in for unknown timestamps, sorts before every real date
pub fn distant_past() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// Utility: lexically remove `.` and `..` components without touching the filesystem
pub fn standardize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// CLI ENTRY

#[derive(Parser, Debug)]
#[command(name = "notes-core", version, about = "List the notes of one directory as JSON lines")]
struct CliArgs {
    #[arg(value_name = "DIR")]
    dir: PathBuf,
    /// Config file (JSON). Missing or unreadable files fall back to defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Always rescan instead of serving the cached listing.
    #[arg(long)]
    no_cache: bool,
    #[arg(long)]
    save_cache: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let argv = std::iter::once("notes-core".to_string()).chain(args);
    Ok(CliArgs::try_parse_from(argv)?)
}

/// List the notes of one directory as JSON lines on stdout.
pub fn run(args: impl IntoIterator<Item = String>) -> Result<()> {
    let args = parse_args(args)?;
    let config = args
        .config
        .as_deref()
        .map(Config::load)
        .unwrap_or_default();

    let dir = if args.dir.is_absolute() {
        args.dir.clone()
    } else {
        std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(&args.dir)
    };

    let mut library = Library::open(config);
    let id = library.add_project(
        &dir,
        ProjectOptions {
            cache: !args.no_cache,
            ..ProjectOptions::root()
        },
    )?;

    let mut notes = library.notes(id)?;
    if let Some(project) = library.project(id) {
        project.sort_notes(&mut notes);
    }

    for note in &notes {
        println!("{}", serde_json::to_string(note)?);
    }

    if args.save_cache {
        library.save_cache(id, &notes)?;
    }

    tracing::info!("Listed {} notes from {}", notes.len(), dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_distant_past_is_year_one() {
        let past = distant_past();
        assert_eq!(past.to_rfc3339(), "0001-01-01T00:00:00+00:00");
        assert!(past < Utc::now());
    }

    #[test]
    fn test_standardize_path() {
        assert_eq!(standardize_path(Path::new("/a/./b/../c/")), PathBuf::from("/a/c"));
        assert_eq!(standardize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(standardize_path(Path::new("../a/..")), PathBuf::from(".."));
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(["--no-cache".to_string(), "/tmp/notes".to_string()]).unwrap();
        assert!(args.no_cache);
        assert!(!args.save_cache);
        assert_eq!(args.dir, PathBuf::from("/tmp/notes"));

        let args = parse_args([
            "notes".to_string(),
            "--config".to_string(),
            "c.json".to_string(),
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.json")));
        assert!(!args.no_cache);

        assert!(parse_args(Vec::<String>::new()).is_err());
        assert!(parse_args(["--bogus".to_string()]).is_err());
        assert!(parse_args(["a".to_string(), "b".to_string()]).is_err());
    }

    #[test]
    fn test_run_saves_cache() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir_all(&notes).unwrap();
        std::fs::write(notes.join("a.md"), "# A").unwrap();

        let config = Config::in_dir(dir.path());
        let config_path = dir.path().join("config.json");
        config.save(&config_path).unwrap();

        run([
            "--save-cache".to_string(),
            "--config".to_string(),
            config_path.to_string_lossy().to_string(),
            notes.to_string_lossy().to_string(),
        ])
        .unwrap();

        let cached = MetaCache::new(&config.caches_dir).load(&notes);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "a.md");
    }
}
