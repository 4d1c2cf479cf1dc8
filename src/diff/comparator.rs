use std::cmp::Ordering;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::{debug, trace};

use crate::diff::{ChangeSet, ChangeSetError};
use crate::ext::BestEffortPathExt;
use crate::filesystem::{
    DirectoryTree, EntryKind, PathEntry, TreeError, collect_subtree_files, list_entries,
};

const COMPARE_CHUNK_SIZE: usize = 64 * 1024;

/// Classification of the direct children of one directory pair.
///
/// Every child name of either side lands in exactly one of the sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirComparison {
    pub only_left: Vec<PathEntry>,
    pub only_right: Vec<PathEntry>,
    pub identical: Vec<OsString>,
    pub different: Vec<OsString>,
    pub common_dirs: Vec<OsString>,
    /// Same name, directory on one side and file on the other.
    pub mismatched: Vec<Mismatch>,
    /// Common file-like names whose content was not compared.
    pub unchecked: Vec<OsString>,
}

/// Whether common files are read while merging two directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contents {
    Compare,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub name: OsString,
    pub left: EntryKind,
    pub right: EntryKind,
}

/// Walks two release trees side by side.
pub struct TreeComparator;

impl TreeComparator {
    /// Diffs two trees into a [`ChangeSet`] of root-relative paths.
    pub fn compare(old: &DirectoryTree, new: &DirectoryTree) -> Result<ChangeSet, CompareError> {
        debug!(
            "Comparing {} against {}",
            old.root().display(),
            new.root().display()
        );
        let changed = Self::find_changed(old.root(), new.root())?;
        let removed = Self::find_removed(old.root(), new.root())?;
        debug!(
            "Found {} changed and {} removed files",
            changed.len(),
            removed.len()
        );

        ChangeSet::from_absolute(&changed, new.root(), &removed, old.root()).context(AggregateSnafu)
    }

    /// Every file under `new_dir` that is new or whose content differs from `old_dir`.
    pub fn find_changed(old_dir: &Path, new_dir: &Path) -> Result<Vec<PathBuf>, CompareError> {
        let mut changed = Vec::new();
        let mut pending = vec![(old_dir.to_path_buf(), new_dir.to_path_buf())];

        while let Some((old, new)) = pending.pop() {
            let comparison = Self::compare_dirs(&old, &new)?;
            trace!(
                "{} unchanged files in {}",
                comparison.identical.len(),
                new.display()
            );

            for entry in comparison.only_right {
                Self::collect_files(&new.join(&entry.name), entry.kind, &mut changed)?;
            }
            for name in comparison.different {
                changed.push(new.join(name));
            }
            for mismatch in comparison.mismatched {
                Self::collect_files(&new.join(&mismatch.name), mismatch.right, &mut changed)?;
            }
            for name in comparison.common_dirs {
                pending.push((old.join(&name), new.join(&name)));
            }
        }

        Ok(changed)
    }

    /// Every file under `old_dir` with no counterpart under `new_dir`.
    ///
    /// Only names and kinds matter here, so common files are never read.
    pub fn find_removed(old_dir: &Path, new_dir: &Path) -> Result<Vec<PathBuf>, CompareError> {
        let mut removed = Vec::new();
        let mut pending = vec![(old_dir.to_path_buf(), new_dir.to_path_buf())];

        while let Some((old, new)) = pending.pop() {
            let comparison = Self::merge_dirs(&old, &new, Contents::Skip)?;
            trace!(
                "{} common files in {}",
                comparison.unchecked.len(),
                old.display()
            );

            for entry in comparison.only_left {
                Self::collect_files(&old.join(&entry.name), entry.kind, &mut removed)?;
            }
            for mismatch in comparison.mismatched {
                Self::collect_files(&old.join(&mismatch.name), mismatch.left, &mut removed)?;
            }
            for name in comparison.common_dirs {
                pending.push((old.join(&name), new.join(&name)));
            }
        }

        Ok(removed)
    }

    /// Merges the sorted child listings of `left` and `right`.
    pub fn compare_dirs(left: &Path, right: &Path) -> Result<DirComparison, CompareError> {
        Self::merge_dirs(left, right, Contents::Compare)
    }

    fn merge_dirs(
        left: &Path,
        right: &Path,
        contents: Contents,
    ) -> Result<DirComparison, CompareError> {
        let left_entries = list_entries(left).context(WalkSnafu)?;
        let right_entries = list_entries(right).context(WalkSnafu)?;
        let mut comparison = DirComparison::default();

        let mut left_iter = left_entries.into_iter().peekable();
        let mut right_iter = right_entries.into_iter().peekable();

        loop {
            let order = match (left_iter.peek(), right_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(l), Some(r)) => l.name.cmp(&r.name),
            };

            match order {
                Ordering::Less => comparison.only_left.extend(left_iter.next()),
                Ordering::Greater => comparison.only_right.extend(right_iter.next()),
                Ordering::Equal => {
                    if let (Some(l), Some(r)) = (left_iter.next(), right_iter.next()) {
                        Self::classify_common(left, right, l, r, contents, &mut comparison)?;
                    }
                }
            }
        }

        Ok(comparison)
    }

    fn classify_common(
        left: &Path,
        right: &Path,
        l: PathEntry,
        r: PathEntry,
        contents: Contents,
        comparison: &mut DirComparison,
    ) -> Result<(), CompareError> {
        match (l.kind, r.kind) {
            (EntryKind::Directory, EntryKind::Directory) => comparison.common_dirs.push(l.name),
            (EntryKind::Directory, _) | (_, EntryKind::Directory) => {
                trace!("Kind mismatch for {:?}: {} vs {}", l.name, l.kind, r.kind);
                comparison.mismatched.push(Mismatch {
                    name: l.name,
                    left: l.kind,
                    right: r.kind,
                });
            }
            _ if contents == Contents::Skip => comparison.unchecked.push(l.name),
            (left_kind, right_kind) => {
                let left_path = left.join(&l.name);
                let right_path = right.join(&r.name);
                let same = left_kind == right_kind
                    && Self::same_content(&left_path, &right_path, left_kind)?;
                if same {
                    comparison.identical.push(l.name);
                } else {
                    comparison.different.push(l.name);
                }
            }
        }
        Ok(())
    }

    fn same_content(left: &Path, right: &Path, kind: EntryKind) -> Result<bool, CompareError> {
        if kind == EntryKind::Symlink {
            let left_target = fs::read_link(left).context(ReadSnafu { path: left.to_path_buf() })?;
            let right_target =
                fs::read_link(right).context(ReadSnafu { path: right.to_path_buf() })?;
            return Ok(left_target == right_target);
        }
        files_equal(left, right)
    }

    fn collect_files(path: &Path, kind: EntryKind, out: &mut Vec<PathBuf>) -> Result<(), CompareError> {
        if kind.is_file_like() {
            out.push(path.to_path_buf());
            Ok(())
        } else {
            collect_subtree_files(path, out).context(WalkSnafu)
        }
    }
}

/// Byte-for-byte equality. Lengths are compared before any content is read.
pub fn files_equal(left: &Path, right: &Path) -> Result<bool, CompareError> {
    let left_len = fs::metadata(left).context(ReadSnafu { path: left.to_path_buf() })?.len();
    let right_len = fs::metadata(right).context(ReadSnafu { path: right.to_path_buf() })?.len();
    if left_len != right_len {
        return Ok(false);
    }

    let mut left_reader =
        BufReader::new(File::open(left).context(ReadSnafu { path: left.to_path_buf() })?);
    let mut right_reader =
        BufReader::new(File::open(right).context(ReadSnafu { path: right.to_path_buf() })?);
    let mut left_buf = vec![0u8; COMPARE_CHUNK_SIZE];
    let mut right_buf = vec![0u8; COMPARE_CHUNK_SIZE];

    loop {
        let left_read =
            fill_chunk(&mut left_reader, &mut left_buf).context(ReadSnafu { path: left.to_path_buf() })?;
        let right_read = fill_chunk(&mut right_reader, &mut right_buf)
            .context(ReadSnafu { path: right.to_path_buf() })?;

        if left_read != right_read || left_buf[..left_read] != right_buf[..right_read] {
            return Ok(false);
        }
        if left_read == 0 {
            return Ok(true);
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[derive(Debug, Snafu)]
pub enum CompareError {
    #[snafu(display("Failed to walk release tree"))]
    WalkError { source: TreeError },
    #[snafu(display("Failed to read {}", path.best_effort_path_display()))]
    ReadError { path: PathBuf, source: std::io::Error },
    #[snafu(display("Failed to build change set"))]
    AggregateError { source: ChangeSetError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tempfile::TempDir;

    fn build_tree(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for (relative, contents) in files {
            let path = temp_dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        temp_dir
    }

    fn diff(old: &TempDir, new: &TempDir) -> ChangeSet {
        let old = DirectoryTree::open(old.path()).unwrap();
        let new = DirectoryTree::open(new.path()).unwrap();
        TreeComparator::compare(&old, &new).unwrap()
    }

    #[rstest]
    #[case::identical(
        &[("a.txt", "1"), ("dir/b.txt", "2")],
        &[("a.txt", "1"), ("dir/b.txt", "2")],
        &[],
        &[]
    )]
    #[case::added_file(&[("a.txt", "1")], &[("a.txt", "1"), ("c.txt", "3")], &["c.txt"], &[])]
    #[case::modified_and_removed(
        &[("a.txt", "1"), ("b.txt", "2")],
        &[("a.txt", "9")],
        &["a.txt"],
        &["b.txt"]
    )]
    #[case::removed_directory(
        &[("dir/x.txt", "1"), ("dir/y.txt", "2")],
        &[],
        &[],
        &["dir/x.txt", "dir/y.txt"]
    )]
    #[case::added_directory(
        &[],
        &[("newdir/a.txt", "1"), ("newdir/b.txt", "2")],
        &["newdir/a.txt", "newdir/b.txt"],
        &[]
    )]
    fn classifies_release_scenarios(
        #[case] old_files: &[(&str, &str)],
        #[case] new_files: &[(&str, &str)],
        #[case] expected_changed: &[&str],
        #[case] expected_removed: &[&str],
    ) {
        let old = build_tree(old_files);
        let new = build_tree(new_files);

        let change_set = diff(&old, &new);

        assert_eq!(change_set.changed(), expected_changed);
        assert_eq!(change_set.removed(), expected_removed);
    }

    #[test]
    fn tree_compared_with_itself_is_empty() {
        let tree = build_tree(&[("a.txt", "1"), ("x/y/z.txt", "deep"), ("x/w.bin", "\0\u{1}")]);
        let change_set = diff(&tree, &tree);
        assert!(change_set.is_empty());
    }

    #[test]
    fn same_size_different_bytes_is_modified() {
        let old = build_tree(&[("a.txt", "abcd")]);
        let new = build_tree(&[("a.txt", "abce")]);

        let change_set = diff(&old, &new);
        assert_eq!(change_set.changed(), ["a.txt"]);
        assert!(change_set.removed().is_empty());
    }

    #[test]
    fn nested_changes_are_found_in_common_directories() {
        let old = build_tree(&[
            ("inc/a.php", "a"),
            ("inc/sub/b.php", "b"),
            ("inc/sub/gone.php", "g"),
            ("inc/same.php", "s"),
        ]);
        let new = build_tree(&[
            ("inc/a.php", "a2"),
            ("inc/sub/b.php", "b"),
            ("inc/sub/new.php", "n"),
            ("inc/same.php", "s"),
            ("inc/fresh/deep/c.php", "c"),
        ]);

        let change_set = diff(&old, &new);
        assert_eq!(
            change_set.changed(),
            ["inc/a.php", "inc/fresh/deep/c.php", "inc/sub/new.php"]
        );
        assert_eq!(change_set.removed(), ["inc/sub/gone.php"]);
    }

    #[test]
    fn file_replaced_by_directory_is_removed_and_added() {
        let old = build_tree(&[("thing", "was a file")]);
        let new = build_tree(&[("thing/a.txt", "1"), ("thing/b/c.txt", "2")]);

        let change_set = diff(&old, &new);
        assert_eq!(change_set.changed(), ["thing/a.txt", "thing/b/c.txt"]);
        assert_eq!(change_set.removed(), ["thing"]);
    }

    #[test]
    fn directory_replaced_by_file_is_removed_and_added() {
        let old = build_tree(&[("thing/a.txt", "1"), ("thing/b.txt", "2")]);
        let new = build_tree(&[("thing", "now a file")]);

        let change_set = diff(&old, &new);
        assert_eq!(change_set.changed(), ["thing"]);
        assert_eq!(change_set.removed(), ["thing/a.txt", "thing/b.txt"]);
    }

    #[test]
    fn empty_new_directory_adds_nothing() {
        let old = build_tree(&[("a.txt", "1")]);
        let new = build_tree(&[("a.txt", "1")]);
        fs::create_dir_all(new.path().join("empty/nested")).unwrap();

        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn deep_nesting_is_walked_without_limit() {
        let deep = (0..200).map(|i| format!("d{i}")).collect::<Vec<_>>().join("/");
        let file = format!("{deep}/leaf.txt");
        let old = build_tree(&[]);
        let new = build_tree(&[(file.as_str(), "leaf")]);

        let change_set = diff(&old, &new);
        assert_eq!(change_set.changed(), [file.as_str()]);
    }

    #[test]
    fn compare_dirs_partitions_every_name() {
        let old = build_tree(&[("both.txt", "1"), ("diff.txt", "a"), ("left.txt", "l"), ("dir/x", "x"), ("kind", "f")]);
        let new = build_tree(&[("both.txt", "1"), ("diff.txt", "b"), ("right.txt", "r"), ("dir/x", "x"), ("kind/y", "y")]);

        let comparison = TreeComparator::compare_dirs(old.path(), new.path()).unwrap();

        let names = |entries: &[PathEntry]| entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&comparison.only_left), [OsString::from("left.txt")]);
        assert_eq!(names(&comparison.only_right), [OsString::from("right.txt")]);
        assert_eq!(comparison.identical, [OsString::from("both.txt")]);
        assert_eq!(comparison.different, [OsString::from("diff.txt")]);
        assert_eq!(comparison.common_dirs, [OsString::from("dir")]);
        assert_eq!(
            comparison.mismatched,
            [Mismatch {
                name: OsString::from("kind"),
                left: EntryKind::File,
                right: EntryKind::Directory,
            }]
        );
    }

    #[test]
    fn repeated_comparison_is_deterministic() {
        let old = build_tree(&[("a.txt", "1"), ("z/b.txt", "2"), ("m/c.txt", "3")]);
        let new = build_tree(&[("a.txt", "2"), ("m/c.txt", "4"), ("n/d.txt", "5"), ("b.txt", "6")]);

        let first = diff(&old, &new);
        let second = diff(&old, &new);
        assert_eq!(first, second);
        assert_eq!(first.changed(), ["a.txt", "b.txt", "m/c.txt", "n/d.txt"]);
        assert_eq!(first.removed(), ["z/b.txt"]);
    }

    #[test]
    fn files_equal_handles_multi_chunk_content() {
        let big = "x".repeat(COMPARE_CHUNK_SIZE * 2 + 17);
        let mut altered = big.clone();
        altered.replace_range(COMPARE_CHUNK_SIZE + 3..COMPARE_CHUNK_SIZE + 4, "y");
        let tree = build_tree(&[("a", big.as_str()), ("b", big.as_str()), ("c", altered.as_str())]);

        assert!(files_equal(&tree.path().join("a"), &tree.path().join("b")).unwrap());
        assert!(!files_equal(&tree.path().join("a"), &tree.path().join("c")).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_compare_by_target() {
        use std::os::unix::fs::symlink;

        let old = build_tree(&[("target.txt", "t")]);
        let new = build_tree(&[("target.txt", "t")]);
        symlink("target.txt", old.path().join("same")).unwrap();
        symlink("target.txt", new.path().join("same")).unwrap();
        symlink("target.txt", old.path().join("moved")).unwrap();
        symlink("elsewhere.txt", new.path().join("moved")).unwrap();

        let change_set = diff(&old, &new);
        assert_eq!(change_set.changed(), ["moved"]);
        assert!(change_set.removed().is_empty());
    }

    #[test]
    fn missing_entry_surfaces_walk_error() {
        let old = build_tree(&[]);
        let result = TreeComparator::find_changed(old.path(), &old.path().join("gone"));
        assert!(matches!(result, Err(CompareError::WalkError { .. })));
    }

    #[test]
    fn removed_walk_leaves_common_files_unread() {
        let old = build_tree(&[("same.txt", "1"), ("diff.txt", "a"), ("gone.txt", "g"), ("kind", "f")]);
        let new = build_tree(&[("same.txt", "1"), ("diff.txt", "b"), ("kind/y", "y")]);

        let comparison =
            TreeComparator::merge_dirs(old.path(), new.path(), Contents::Skip).unwrap();

        assert!(comparison.identical.is_empty());
        assert!(comparison.different.is_empty());
        assert_eq!(
            comparison.unchecked,
            [OsString::from("diff.txt"), OsString::from("same.txt")]
        );
        assert_eq!(comparison.mismatched.len(), 1);

        let removed = TreeComparator::find_removed(old.path(), new.path()).unwrap();
        assert_eq!(removed, [old.path().join("gone.txt"), old.path().join("kind")]);
    }

    #[test]
    fn content_comparison_never_reports_unchecked() {
        let old = build_tree(&[("same.txt", "1"), ("diff.txt", "a")]);
        let new = build_tree(&[("same.txt", "1"), ("diff.txt", "b")]);

        let comparison = TreeComparator::compare_dirs(old.path(), new.path()).unwrap();
        assert!(comparison.unchecked.is_empty());
    }
}
