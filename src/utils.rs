//! Common filesystem utilities shared across modules.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lower-cased extension of `path` including the leading dot, or `""`.
///
/// Dotfiles such as `.env` have no extension.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Create `dir` (and parents) if it does not exist yet.
///
/// Returns `true` when the directory was created.
pub async fn ensure_directory_exists(dir: &Path) -> std::io::Result<bool> {
    if tokio::fs::metadata(dir).await.is_ok() {
        return Ok(false);
    }
    tokio::fs::create_dir_all(dir).await?;
    crate::log_event!("fs", "created directory", "{}", dir.display());
    Ok(true)
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    /// Extension without the dot, or `"directory"`.
    pub file_type: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

/// List the entries of `dir`, creating it first if it is missing.
///
/// Entries that cannot be stat'ed are skipped. When `include_directories`
/// is false, subdirectories are left out. Results are sorted by name.
pub async fn list_directory(dir: &Path, include_directories: bool) -> std::io::Result<Vec<FileInfo>> {
    ensure_directory_exists(dir).await?;

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut infos = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let stats = match entry.metadata().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("[fs] cannot stat {}: {e}", path.display());
                continue;
            }
        };

        let is_directory = stats.is_dir();
        if is_directory && !include_directories {
            continue;
        }

        let file_type = if is_directory {
            "directory".to_string()
        } else {
            file_extension(&path).trim_start_matches('.').to_string()
        };

        infos.push(FileInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            file_type,
            size: stats.len(),
            last_modified: stats.modified().ok().map(DateTime::<Utc>::from),
            is_directory,
        });
    }

    infos.sort_by(|a, b| a.name.cmp(&b.name));
    crate::debug_event!("fs", "listed", "{} entries in {}", infos.len(), dir.display());
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(Path::new("data/Report.XLSX")), ".xlsx");
        assert_eq!(file_extension(Path::new("a.tar.gz")), ".gz");
        assert_eq!(file_extension(Path::new("README")), "");
        assert_eq!(file_extension(Path::new(".env")), "");
    }

    #[tokio::test]
    async fn test_ensure_directory_exists() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");

        assert!(ensure_directory_exists(&nested).await.unwrap());
        assert!(nested.is_dir());
        assert!(!ensure_directory_exists(&nested).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.csv"), "x\n1\n").unwrap();
        std::fs::write(temp_dir.path().join("a.json"), "[]").unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let all = list_directory(temp_dir.path(), true).await.unwrap();
        let names: Vec<_> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.csv", "sub"]);
        assert_eq!(all[1].file_type, "csv");
        assert_eq!(all[1].size, 4);
        assert_eq!(all[2].file_type, "directory");

        let files = list_directory(temp_dir.path(), false).await.unwrap();
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_list_directory_creates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("uploads");
        assert!(list_directory(&missing, true).await.unwrap().is_empty());
        assert!(missing.is_dir());
    }
}
