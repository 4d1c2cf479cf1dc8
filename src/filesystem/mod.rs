//! Read-only views over extracted release trees.
//!
//! A [`DirectoryTree`] is a validated root; [`PathEntry`] values are the
//! classified children of one directory, listed in name order so that two
//! listings can be merged side by side.

mod tree;

pub use tree::{DirectoryTree, EntryKind, PathEntry, TreeError, list_entries};
pub(crate) use tree::collect_subtree_files;
