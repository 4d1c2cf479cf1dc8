use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::config::WinscpConfig;
use crate::ext::BestEffortPathExt;
use crate::output::{WriteError, write_text};

/// WinSCP batch that backs up every removed file locally before deleting it remotely.
#[derive(Debug, Clone)]
pub struct WinscpScript<'a> {
    pub removed: &'a [String],
    pub settings: &'a WinscpConfig,
}

impl WinscpScript<'_> {
    pub fn render(&self) -> String {
        let backup_dir = std::path::absolute(&self.settings.backup_dir)
            .unwrap_or_else(|_| self.settings.backup_dir.clone());

        let mut lines = vec![
            "option batch on".to_string(),
            "option confirm off".to_string(),
            format!("open sftp://{}@{}/", self.settings.user, self.settings.host),
            format!("cd {}", self.settings.remote_base_path),
            format!("lcd {}", backup_dir.display()),
        ];
        lines.extend(
            self.removed
                .iter()
                .map(|path| format!("get \"{path}\" \"{}\"", local_name(path))),
        );
        lines.extend(self.removed.iter().map(|path| format!("rm \"{path}\"")));
        lines.push("close".to_string());
        lines.push("exit".to_string());

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    /// Creates the local folder layout the `get` commands download into, then writes the script.
    pub async fn write(&self, path: &Path) -> Result<(), WinscpScriptError> {
        for removed in self.removed {
            let local = self.settings.backup_dir.join(local_name(removed));
            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent).context(BackupDirSnafu {
                    path: parent.to_path_buf(),
                })?;
            }
        }
        debug!(
            "Prepared backup folder at {}",
            self.settings.backup_dir.best_effort_path_display()
        );

        write_text(path, self.render()).await.context(WriteSnafu)
    }
}

/// Relative path using the host separator, as WinSCP expects for local names.
fn local_name(remote: &str) -> String {
    remote
        .split('/')
        .collect::<PathBuf>()
        .display()
        .to_string()
}

#[derive(Debug, Snafu)]
pub enum WinscpScriptError {
    #[snafu(display("Failed to create backup folder {}", path.best_effort_path_display()))]
    BackupDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write WinSCP script"))]
    WriteError { source: WriteError },
}
