use std::fs;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::ext::BestEffortPathExt;
use crate::filesystem::{DirectoryTree, TreeError};
use crate::process::{CommandError, ExternalCommand};

/// Unpacks `archive` into `dest` and opens the release root inside it.
pub async fn expand_archive(archive: &Path, dest: &Path) -> Result<DirectoryTree, ExtractError> {
    fs::create_dir_all(dest).context(CreateDirSnafu {
        path: dest.to_path_buf(),
    })?;

    ExternalCommand::new("unzip")
        .arg("-q")
        .arg(archive)
        .arg("-d")
        .arg(dest)
        .run()
        .await
        .context(UnzipSnafu {
            archive: archive.to_path_buf(),
        })?;

    let root = release_root(dest)?;
    debug!("Release root is {}", root.best_effort_path_display());
    DirectoryTree::open(root).context(OpenSnafu)
}

/// Archives usually wrap everything in a single top-level folder; use it when present.
pub fn release_root(extracted: &Path) -> Result<PathBuf, ExtractError> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(extracted).context(ListSnafu {
        path: extracted.to_path_buf(),
    })? {
        let entry = entry.context(ListSnafu {
            path: extracted.to_path_buf(),
        })?;
        let is_dir = entry
            .file_type()
            .context(ListSnafu { path: entry.path() })?
            .is_dir();
        if is_dir {
            subdirs.push(entry.path());
        }
    }

    match subdirs.as_slice() {
        [only] => Ok(only.clone()),
        _ => Ok(extracted.to_path_buf()),
    }
}

#[derive(Debug, Snafu)]
pub enum ExtractError {
    #[snafu(display("Failed to create extraction directory {}", path.best_effort_path_display()))]
    CreateDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to expand archive {}", archive.best_effort_path_display()))]
    UnzipError {
        archive: PathBuf,
        source: CommandError,
    },
    #[snafu(display("Failed to list {}", path.best_effort_path_display()))]
    ListError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Extracted release is not a usable tree"))]
    OpenError { source: TreeError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn single_top_level_directory_becomes_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(temp_dir.path().join("YOURLS-1.9.2/includes")).unwrap();

        let root = release_root(temp_dir.path()).unwrap();
        assert_eq!(root, temp_dir.path().join("YOURLS-1.9.2"));
    }

    #[test]
    fn loose_files_next_to_single_directory_are_ignored() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(temp_dir.path().join("app")).unwrap();
        fs::write(temp_dir.path().join("README"), "x").unwrap();

        let root = release_root(temp_dir.path()).unwrap();
        assert_eq!(root, temp_dir.path().join("app"));
    }

    #[test]
    fn several_top_level_directories_keep_extraction_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(temp_dir.path().join("a")).unwrap();
        fs::create_dir_all(temp_dir.path().join("b")).unwrap();

        let root = release_root(temp_dir.path()).unwrap();
        assert_eq!(root, temp_dir.path());
    }

    #[compio::test]
    async fn expand_archive_fails_on_missing_archive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = expand_archive(&temp_dir.path().join("missing.zip"), &temp_dir.path().join("out")).await;
        assert!(matches!(
            result,
            Err(ExtractError::UnzipError { .. })
        ));
    }
}
