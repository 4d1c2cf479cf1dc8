use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use derive_more::Display;
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::ext::BestEffortPathExt;

/// Kind of a directory child. Symbolic links are never followed and count as files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EntryKind {
    #[display("file")]
    File,
    #[display("symlink")]
    Symlink,
    #[display("directory")]
    Directory,
}

impl EntryKind {
    fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Whether the entry is listed as a file in change sets and counts.
    pub fn is_file_like(self) -> bool {
        !matches!(self, EntryKind::Directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub name: OsString,
    pub kind: EntryKind,
}

/// A directory that existed when it was opened and is treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    root: PathBuf,
}

impl DirectoryTree {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TreeError> {
        let root = root.into();
        let metadata = fs::metadata(&root).context(RootMissingSnafu { root: root.clone() })?;
        ensure!(metadata.is_dir(), RootNotDirectorySnafu { root });

        let root = std::path::absolute(&root).context(RootMissingSnafu { root: root.clone() })?;
        debug!("Opened tree at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn count_files(&self) -> Result<usize, TreeError> {
        count_files(&self.root)
    }
}

/// Lists the children of `dir` sorted by name.
pub fn list_entries(dir: &Path) -> Result<Vec<PathEntry>, TreeError> {
    let mut entries = fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir.to_path_buf() })?
        .map(|entry| {
            let entry = entry.context(ReadDirSnafu { path: dir.to_path_buf() })?;
            let file_type = entry
                .file_type()
                .context(MetadataSnafu { path: entry.path() })?;
            Ok(PathEntry {
                name: entry.file_name(),
                kind: EntryKind::from_file_type(file_type),
            })
        })
        .collect::<Result<Vec<_>, TreeError>>()?;

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Counts every file-like entry under `root`, at any depth.
pub fn count_files(root: &Path) -> Result<usize, TreeError> {
    let mut pending = vec![root.to_path_buf()];
    let mut count = 0;

    while let Some(dir) = pending.pop() {
        for entry in list_entries(&dir)? {
            match entry.kind {
                EntryKind::Directory => pending.push(dir.join(&entry.name)),
                _ => count += 1,
            }
        }
    }

    Ok(count)
}

/// Appends every file-like path under `dir` to `out`, in no particular order.
pub(crate) fn collect_subtree_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TreeError> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in list_entries(&dir)? {
            let path = dir.join(&entry.name);
            match entry.kind {
                EntryKind::Directory => pending.push(path),
                _ => out.push(path),
            }
        }
    }

    Ok(())
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Tree root {} does not exist or is not accessible", root.best_effort_path_display()))]
    RootMissing { root: PathBuf, source: std::io::Error },
    #[snafu(display("Tree root {} is not a directory", root.best_effort_path_display()))]
    RootNotDirectory { root: PathBuf },
    #[snafu(display("Failed to list directory {}", path.best_effort_path_display()))]
    ReadDir { path: PathBuf, source: std::io::Error },
    #[snafu(display("Failed to read metadata of {}", path.best_effort_path_display()))]
    Metadata { path: PathBuf, source: std::io::Error },
}
