use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{ResultExt, Snafu, ensure};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::ext::BestEffortPathExt;
use crate::process::{CommandError, ExternalCommand};

/// End-of-central-directory record of an archive with no entries.
const EMPTY_ZIP: [u8; 22] = [
    0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Zips the changed files of `new_root` into `package`, each under its relative path.
pub async fn build_package(
    changed: &[String],
    new_root: &Path,
    package: &Path,
) -> Result<usize, PackageError> {
    let package = std::path::absolute(package).context(ResolveSnafu {
        path: package.to_path_buf(),
    })?;
    info!("Creating package {}", package.best_effort_path_display());

    match fs::remove_file(&package).await {
        Ok(()) => debug!("Replaced existing {}", package.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(ResolveSnafu { path: package }),
    }
    if let Some(parent) = package.parent() {
        fs::create_dir_all(parent)
            .await
            .context(ResolveSnafu { path: package.clone() })?;
    }

    if changed.is_empty() {
        fs::write(&package, EMPTY_ZIP.to_vec())
            .await
            .0
            .context(ResolveSnafu { path: package.clone() })?;
        return Ok(0);
    }

    let names = write_name_list(changed, &package)?;
    ExternalCommand::new("zip")
        .args(["-q", "-X"])
        .arg(&package)
        .arg("-@")
        .stdin_file(names.path())
        .current_dir(new_root)
        .run()
        .await
        .context(ZipSnafu { path: package.clone() })?;

    let entries = list_entries(&package).await?;
    ensure!(
        entries.len() == changed.len(),
        IncompleteSnafu {
            path: package,
            expected: changed.len(),
            actual: entries.len(),
        }
    );

    Ok(entries.len())
}

/// Names of the entries stored in `package`, in archive order.
async fn list_entries(package: &Path) -> Result<Vec<String>, PackageError> {
    let listing = ExternalCommand::new("unzip")
        .arg("-Z1")
        .arg(package)
        .capture()
        .await
        .context(ListSnafu {
            path: package.to_path_buf(),
        })?;
    Ok(listing.lines().map(str::to_string).collect())
}

/// `zip -@` takes one name per line, so option-like names are never parsed as flags.
fn write_name_list(changed: &[String], package: &Path) -> Result<NamedTempFile, PackageError> {
    let mut names = NamedTempFile::new().context(NameListSnafu {
        path: package.to_path_buf(),
    })?;
    for name in changed {
        writeln!(names, "{name}").context(NameListSnafu {
            path: package.to_path_buf(),
        })?;
    }
    names.flush().context(NameListSnafu {
        path: package.to_path_buf(),
    })?;
    Ok(names)
}

#[derive(Debug, Snafu)]
pub enum PackageError {
    #[snafu(display("Failed to prepare package location {}", path.best_effort_path_display()))]
    ResolveError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write the entry list for {}", path.best_effort_path_display()))]
    NameListError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to build package {}", path.best_effort_path_display()))]
    ZipError { path: PathBuf, source: CommandError },
    #[snafu(display("Failed to list entries of {}", path.best_effort_path_display()))]
    ListError { path: PathBuf, source: CommandError },
    #[snafu(display(
        "Package {} holds {actual} entries, expected {expected}",
        path.best_effort_path_display()
    ))]
    IncompleteError {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}
