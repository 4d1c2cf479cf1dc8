use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use crate::ext::{RelativePathError, relative_slash_path};

/// Outcome of a tree comparison, as sorted root-relative paths with `/` separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changed: Vec<String>,
    removed: Vec<String>,
}

impl ChangeSet {
    pub fn from_absolute(
        changed: &[PathBuf],
        new_root: &Path,
        removed: &[PathBuf],
        old_root: &Path,
    ) -> Result<Self, ChangeSetError> {
        Ok(Self {
            changed: to_relative_manifest(changed, new_root)?,
            removed: to_relative_removed_list(removed, old_root)?,
        })
    }

    /// Added and modified files, relative to the new root.
    pub fn changed(&self) -> &[String] {
        &self.changed
    }

    /// Files without a counterpart in the new tree, relative to the old root.
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

pub fn to_relative_manifest(changed: &[PathBuf], new_root: &Path) -> Result<Vec<String>, ChangeSetError> {
    relative_sorted(changed, new_root)
}

pub fn to_relative_removed_list(
    removed: &[PathBuf],
    old_root: &Path,
) -> Result<Vec<String>, ChangeSetError> {
    relative_sorted(removed, old_root)
}

fn relative_sorted(paths: &[PathBuf], root: &Path) -> Result<Vec<String>, ChangeSetError> {
    let mut relative = paths
        .iter()
        .map(|path| relative_slash_path(path, root))
        .collect::<Result<Vec<_>, _>>()
        .context(RelativizeSnafu)?;

    relative.sort_unstable();
    relative.dedup();
    Ok(relative)
}

#[derive(Debug, Snafu)]
pub enum ChangeSetError {
    #[snafu(display("Failed to express a path relative to its tree root"))]
    RelativizeError { source: RelativePathError },
}
