use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use crate::config::DeployConfig;
use crate::ext::BestEffortPathExt;
use crate::output::{WriteError, write_text};

/// What the generated script replays on the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode<'a> {
    /// Unpack the patch, upload every manifest entry, then delete removed files.
    Full { package: &'a Path, manifest: &'a Path },
    /// Only delete removed files.
    RemovalOnly,
}

#[derive(Debug, Clone)]
pub struct DeployScript<'a> {
    pub old_tag: &'a str,
    pub new_tag: &'a str,
    pub removed_list: Option<&'a Path>,
    pub mode: DeployMode<'a>,
    pub target: &'a DeployConfig,
}

impl DeployScript<'_> {
    pub fn render(&self) -> String {
        let removed_list = self
            .removed_list
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        let mut lines = vec![
            "#!/bin/bash".to_string(),
            String::new(),
            format!(
                "# Deployment script generated by release-delta ({} -> {})",
                self.old_tag, self.new_tag
            ),
            "# Update the variables below before running.".to_string(),
            String::new(),
            "# Check if ssh is installed".to_string(),
            "if ! command -v ssh >/dev/null 2>&1; then".to_string(),
            "  echo \"Error: ssh is not installed or not found in PATH.\"".to_string(),
            "  exit 1".to_string(),
            "fi".to_string(),
            String::new(),
            format!("REMOVED_MANIFEST=\"{removed_list}\""),
            format!(
                "TARGET_DIR=\"{}\"      # <-- Update this with your server's path",
                self.target.target_dir
            ),
            format!(
                "REMOTE_USER=\"{}\"               # <-- Update with your SSH user",
                self.target.remote_user
            ),
            format!(
                "REMOTE_HOST=\"{}\"     # <-- Update with your server hostname or IP",
                self.target.remote_host
            ),
            String::new(),
            "# Pass --dry-run as first argument to simulate the deploy".to_string(),
            "DRYRUN=\"\"".to_string(),
            "if [ \"$1\" == \"--dry-run\" ]; then".to_string(),
            "  DRYRUN=\"--dry-run\"".to_string(),
            "  echo \"Running in DRY-RUN mode. No files will be copied or deleted.\"".to_string(),
            "fi".to_string(),
            String::new(),
        ];

        match self.mode {
            DeployMode::RemovalOnly => lines.extend(removal_block()),
            DeployMode::Full { package, manifest } => {
                lines.extend([
                    format!("ZIP_FILE=\"{}\"", package.display()),
                    format!("MANIFEST=\"{}\"", manifest.display()),
                    "TEMP_DIR=\"./__deploy_temp\"".to_string(),
                    String::new(),
                    "# Clean and unzip the patch".to_string(),
                    "rm -rf \"$TEMP_DIR\"".to_string(),
                    "mkdir -p \"$TEMP_DIR\"".to_string(),
                    "unzip -q \"$ZIP_FILE\" -d \"$TEMP_DIR\"".to_string(),
                    "echo \"→ Files extracted into $TEMP_DIR\"".to_string(),
                    String::new(),
                    "# Upload changed/added files".to_string(),
                    "echo \"→ Uploading changed files...\"".to_string(),
                    "while IFS= read -r file; do".to_string(),
                    "  rsync -avz $DRYRUN \"$TEMP_DIR/$file\" \"$REMOTE_USER@$REMOTE_HOST:$TARGET_DIR/$file\""
                        .to_string(),
                    "done < \"$MANIFEST\"".to_string(),
                    String::new(),
                ]);
                lines.extend(removal_block());
                lines.extend([
                    String::new(),
                    "# Clean up".to_string(),
                    "rm -rf \"$TEMP_DIR\"".to_string(),
                ]);
            }
        }

        lines.push("echo \"Deployment completed!\"".to_string());
        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    /// Writes the script and marks it executable.
    pub async fn write(&self, path: &Path) -> Result<(), DeployScriptError> {
        write_text(path, self.render()).await.context(WriteSnafu)?;
        make_executable(path)
    }
}

fn removal_block() -> [String; 7] {
    [
        "# Remove deleted files from remote (if any)".to_string(),
        "if [[ -f \"$REMOVED_MANIFEST\" ]]; then".to_string(),
        "  echo \"→ Removing obsolete files...\"".to_string(),
        "  while IFS= read -r file; do".to_string(),
        "    ssh \"$REMOTE_USER@$REMOTE_HOST\" \"rm -f '$TARGET_DIR/$file'\"".to_string(),
        "  done < \"$REMOVED_MANIFEST\"".to_string(),
        "fi".to_string(),
    ]
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), DeployScriptError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).context(
        PermissionsSnafu {
            path: path.to_path_buf(),
        },
    )
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), DeployScriptError> {
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum DeployScriptError {
    #[snafu(display("Failed to write deployment script"))]
    WriteError { source: WriteError },
    #[snafu(display("Failed to mark {} as executable", path.best_effort_path_display()))]
    PermissionsError {
        path: PathBuf,
        source: std::io::Error,
    },
}
