use std::path::{Component, Path, PathBuf};

use snafu::{OptionExt, Snafu, ensure};

pub fn best_effort_path_display(path: &Path) -> String {
    match path.canonicalize() {
        Ok(canonical_path) => canonical_path.display().to_string(),
        Err(_) => {
            let absolute_path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                match std::env::current_dir() {
                    Ok(current_dir) => current_dir.join(path),
                    Err(_) => path.to_path_buf(),
                }
            };

            normalize_path(&absolute_path).display().to_string()
        }
    }
}

/// Resolves `.` and `..` lexically, without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty() && !matches!(components.last(), Some(Component::RootDir))
                {
                    components.pop();
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Expresses `path` relative to `root`, joined with `/` regardless of the host separator.
pub fn relative_slash_path(path: &Path, root: &Path) -> Result<String, RelativePathError> {
    let relative = path.strip_prefix(root).ok().context(OutsideRootSnafu {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return OutsideRootSnafu {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            }
            .fail();
        };
        let segment = segment.to_str().context(NotUtf8Snafu {
            path: path.to_path_buf(),
        })?;
        segments.push(segment);
    }

    ensure!(
        !segments.is_empty(),
        OutsideRootSnafu {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        }
    );

    Ok(segments.join("/"))
}

pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl BestEffortPathExt for Path {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}

impl BestEffortPathExt for PathBuf {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}

#[derive(Debug, Snafu)]
pub enum RelativePathError {
    #[snafu(display("Path {} is not located under {}", path.display(), root.display()))]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[snafu(display("Path {} is not valid UTF-8", path.display()))]
    NotUtf8 { path: PathBuf },
}
