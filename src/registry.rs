//! Resolves which datasets a session can currently pick from.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::UploadCache;
use crate::config::Config;
use crate::error::{DashError, Result};
use crate::logging::log_folder_scan;
use crate::model::DatasetId;

/// Where dataset names come from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Folder(&'a str),
    Uploads(&'a UploadCache),
}

/// Every dataset the source offers, in the source's own order.
///
/// Folder sources never fail here: a missing, unreadable or non-directory path
/// lists as empty. Use [`probe_folder`] to tell those cases apart.
pub fn list_available(source: Source<'_>, extension: &str) -> Vec<DatasetId> {
    match source {
        Source::Folder(folder) => scan_folder(folder, extension).unwrap_or_default(),
        Source::Uploads(cache) => cache.keys().to_vec(),
    }
}

/// Regular files in `folder` whose name ends in `.extension`, any case.
pub fn scan_folder(folder: &str, extension: &str) -> Result<Vec<DatasetId>> {
    if folder.is_empty() {
        return Err(unavailable(folder, "empty path"));
    }
    let dir = Path::new(folder);
    if !dir.is_dir() {
        let reason = if dir.exists() { "not a directory" } else { "does not exist" };
        return Err(unavailable(folder, reason));
    }
    let suffix = format!(".{}", extension.to_lowercase());
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| unavailable(folder, &e.to_string()))? {
        let Ok(entry) = entry else { continue };
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.to_lowercase().ends_with(&suffix) && entry.path().is_file() {
            found.push(DatasetId::new(name));
        }
    }
    Ok(found)
}

fn unavailable(folder: &str, reason: &str) -> DashError {
    DashError::RegistryUnavailable {
        path: folder.to_string(),
        reason: reason.to_string(),
    }
}

pub fn dataset_path(folder: &str, id: &DatasetId) -> PathBuf {
    Path::new(folder).join(id.as_str())
}

/// What a folder path resolves to, for user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum FolderStatus {
    NotEntered,
    Missing,
    NotADirectory,
    NoMatches,
    Found(usize),
}

impl FolderStatus {
    pub fn message(&self, extension: &str) -> String {
        match self {
            FolderStatus::NotEntered => "Please enter the path to your data folder.".to_string(),
            FolderStatus::Missing => "The specified folder does not exist.".to_string(),
            FolderStatus::NotADirectory => "The specified path is not a folder.".to_string(),
            FolderStatus::NoMatches => format!("No .{} files found in this folder.", extension),
            FolderStatus::Found(n) => format!("Found {} .{} files.", n, extension),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderStatus::NotEntered => "not_entered",
            FolderStatus::Missing => "missing",
            FolderStatus::NotADirectory => "not_a_directory",
            FolderStatus::NoMatches => "no_matches",
            FolderStatus::Found(_) => "found",
        }
    }
}

pub fn probe_folder(folder: &str, cfg: &Config) -> FolderStatus {
    let status = if folder.is_empty() || cfg.is_placeholder(folder) {
        FolderStatus::NotEntered
    } else {
        match scan_folder(folder, &cfg.extension) {
            Ok(found) if found.is_empty() => FolderStatus::NoMatches,
            Ok(found) => FolderStatus::Found(found.len()),
            Err(_) if Path::new(folder).exists() => FolderStatus::NotADirectory,
            Err(_) => FolderStatus::Missing,
        }
    };
    let matches = match status {
        FolderStatus::Found(n) => n,
        _ => 0,
    };
    log_folder_scan(folder, status.as_str(), matches);
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawBlob;
    use tempfile::TempDir;

    fn names(ids: &[DatasetId]) -> Vec<String> {
        let mut out: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        out.sort();
        out
    }

    #[test]
    fn folder_listing_filters_by_extension_case_insensitively() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.parquet"), b"x").unwrap();
        fs::write(dir.path().join("B.PARQUET"), b"x").unwrap();
        fs::write(dir.path().join("c.csv"), b"x").unwrap();
        fs::create_dir(dir.path().join("d.parquet")).unwrap();

        let folder = dir.path().to_str().unwrap();
        let found = list_available(Source::Folder(folder), "parquet");
        assert_eq!(names(&found), ["B.PARQUET", "a.parquet"]);
    }

    #[test]
    fn bad_paths_list_as_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.parquet");
        fs::write(&file, b"x").unwrap();
        let missing = dir.path().join("nope");

        for p in [String::new(), missing.display().to_string(), file.display().to_string()] {
            assert!(list_available(Source::Folder(&p), "parquet").is_empty());
        }
        assert!(matches!(
            scan_folder(&missing.display().to_string(), "parquet"),
            Err(DashError::RegistryUnavailable { .. })
        ));
    }

    #[test]
    fn uploads_list_in_first_upload_order() {
        let mut cache = UploadCache::new();
        cache.merge([
            (DatasetId::new("z.parquet"), RawBlob::new(vec![1])),
            (DatasetId::new("a.parquet"), RawBlob::new(vec![1])),
        ]);
        let found = list_available(Source::Uploads(&cache), "parquet");
        assert_eq!(found, vec![DatasetId::new("z.parquet"), DatasetId::new("a.parquet")]);
    }

    #[test]
    fn probe_distinguishes_failure_modes() {
        let cfg = Config::default();
        let dir = TempDir::new().unwrap();
        let folder = dir.path().display().to_string();

        assert_eq!(probe_folder("", &cfg), FolderStatus::NotEntered);
        assert_eq!(probe_folder(&cfg.folder_placeholder, &cfg), FolderStatus::NotEntered);
        assert_eq!(probe_folder(&folder, &cfg), FolderStatus::NoMatches);
        assert_eq!(
            probe_folder(&dir.path().join("gone").display().to_string(), &cfg),
            FolderStatus::Missing
        );

        let file = dir.path().join("one.parquet");
        fs::write(&file, b"x").unwrap();
        assert_eq!(probe_folder(&folder, &cfg), FolderStatus::Found(1));
        assert_eq!(
            probe_folder(&file.display().to_string(), &cfg),
            FolderStatus::NotADirectory
        );
    }
}
