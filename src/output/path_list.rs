use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::ext::BestEffortPathExt;

/// One path per line, each line newline-terminated.
pub fn render_path_list(paths: &[String]) -> String {
    paths.iter().fold(String::new(), |mut out, path| {
        out.push_str(path);
        out.push('\n');
        out
    })
}

pub async fn write_text(path: &Path, contents: String) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.context(WriteSnafu {
            path: path.to_path_buf(),
        })?;
    }

    fs::write(path, contents.into_bytes())
        .await
        .0
        .context(WriteSnafu {
            path: path.to_path_buf(),
        })?;
    debug!("Wrote {}", path.best_effort_path_display());
    Ok(())
}

pub async fn write_path_list(path: &Path, paths: &[String]) -> Result<(), WriteError> {
    write_text(path, render_path_list(paths)).await
}

#[derive(Debug, Snafu)]
#[snafu(display("Failed to write {}", path.best_effort_path_display()))]
pub struct WriteError {
    path: PathBuf,
    source: std::io::Error,
}
