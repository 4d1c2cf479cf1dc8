use std::path::Path;

use snafu::Snafu;
use snafu::prelude::*;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::application::{ArchiveOrigin, RuntimeConfig};
use crate::config::{ConfigError, ReleaseConfig};
use crate::diff::{ChangeSet, CompareError, TreeComparator};
use crate::ext::BestEffortPathExt;
use crate::filesystem::{DirectoryTree, TreeError};
use crate::output::report::{self, Totals};
use crate::output::{
    ArtifactNames, DeployMode, DeployScript, DeployScriptError, PackageError, PatchSummary,
    WinscpScript, WinscpScriptError, WriteError, build_package, write_path_list, write_text,
};
use crate::source::{ExtractError, ReleaseSource, SourceError, expand_archive};

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let release_config = ReleaseConfig::read(app_config.config_path.as_deref())
            .await
            .context(ConfigSnafu)?;
        debug!("Loaded release config: {:?}", release_config);

        report::step(format!(
            "TLS verification is {}.",
            if app_config.verify_tls { "enabled" } else { "disabled" }
        ));
        let source = ReleaseSource::new(release_config.source.clone(), app_config.verify_tls);

        let old_tag = app_config.old_tag.clone();
        let new_tag = match &app_config.new_tag {
            Some(tag) => tag.clone(),
            None => {
                let tag = source.latest_tag().await.context(SourceSnafu)?;
                report::step(format!("No target version specified, using latest: {tag}"));
                tag
            }
        };

        if old_tag == new_tag {
            report::notice(format!(
                "Old tag '{old_tag}' and new tag '{new_tag}' are identical. Nothing to do."
            ));
            return Ok(());
        }

        let names = ArtifactNames::new(
            app_config.output.as_deref(),
            &release_config.source.release_name,
            &old_tag,
            &new_tag,
        );
        debug!("Output names: {:?}", names);

        // Dropping the workspace removes both extracted trees on every return path.
        let workspace = TempDir::new().context(WorkspaceSnafu)?;
        let old_tree = Self::prepare_tree(
            &source,
            &old_tag,
            &app_config.old_archive,
            workspace.path(),
            "old",
        )
        .await?;
        let new_tree = Self::prepare_tree(
            &source,
            &new_tag,
            &app_config.new_archive,
            workspace.path(),
            "new",
        )
        .await?;

        report::step("Comparing directories…");
        let change_set = TreeComparator::compare(&old_tree, &new_tree).context(CompareSnafu)?;

        let run = Run {
            app_config: &app_config,
            release_config: &release_config,
            names: &names,
            old_tag: &old_tag,
            new_tag: &new_tag,
            old_tree: &old_tree,
            new_tree: &new_tree,
            change_set: &change_set,
        };

        if app_config.only_removed {
            run.write_removal_outputs().await
        } else {
            run.write_patch_outputs().await
        }
    }

    async fn prepare_tree(
        source: &ReleaseSource,
        tag: &str,
        origin: &ArchiveOrigin,
        workspace: &Path,
        side: &str,
    ) -> Result<DirectoryTree, ApplicationError> {
        let archive = match origin {
            ArchiveOrigin::Local(path) => {
                report::step(format!(
                    "Using local archive {} for {tag}",
                    path.best_effort_path_display()
                ));
                path.clone()
            }
            ArchiveOrigin::Download => {
                report::step(format!("Downloading {tag}"));
                let dest = workspace.join(format!("{side}.zip"));
                source.download(tag, &dest).await.context(SourceSnafu)?
            }
        };

        expand_archive(&archive, &workspace.join(side))
            .await
            .context(ExtractSnafu)
    }
}

/// State shared by the output stages of one run.
struct Run<'a> {
    app_config: &'a RuntimeConfig,
    release_config: &'a ReleaseConfig,
    names: &'a ArtifactNames,
    old_tag: &'a str,
    new_tag: &'a str,
    old_tree: &'a DirectoryTree,
    new_tree: &'a DirectoryTree,
    change_set: &'a ChangeSet,
}

impl Run<'_> {
    async fn write_removal_outputs(&self) -> Result<(), ApplicationError> {
        let removed = self.change_set.removed();
        if removed.is_empty() {
            report::step("No files to remove from OLD to NEW. Exiting.");
            return Ok(());
        }

        self.write_removed_list().await?;

        DeployScript {
            old_tag: self.old_tag,
            new_tag: self.new_tag,
            removed_list: Some(&self.names.removed),
            mode: DeployMode::RemovalOnly,
            target: &self.release_config.deploy,
        }
        .write(&self.names.deploy_script)
        .await
        .context(DeployScriptSnafu)?;
        report::step(format!(
            "Deployment script generated: {}",
            self.names.deploy_script.display()
        ));
        report::step("You can use the generated script to remove the files from the server.");

        if self.app_config.winscp {
            WinscpScript {
                removed,
                settings: &self.release_config.winscp,
            }
            .write(&self.names.winscp)
            .await
            .context(WinscpSnafu)?;
            report::step(format!("WinSCP script generated: {}", self.names.winscp.display()));
            report::step(format!(
                "Backup folder prepared at: {}",
                self.release_config.winscp.backup_dir.best_effort_path_display()
            ));
        }

        Ok(())
    }

    async fn write_patch_outputs(&self) -> Result<(), ApplicationError> {
        let old_files = self.old_tree.count_files().context(CountSnafu)?;
        let new_files = self.new_tree.count_files().context(CountSnafu)?;
        Totals {
            old_tag: self.old_tag,
            new_tag: self.new_tag,
            old_files,
            new_files,
            changed: self.change_set.changed().len(),
            removed: self.change_set.removed().len(),
        }
        .print();

        if self.change_set.is_empty() {
            report::notice("No differences found. Exiting.");
            return Ok(());
        }

        write_path_list(&self.names.manifest, self.change_set.changed())
            .await
            .context(OutputSnafu)?;
        report::step(format!("Manifest saved to {}", self.names.manifest.display()));

        let has_removed = !self.change_set.removed().is_empty();
        if has_removed {
            self.write_removed_list().await?;
        }

        let packaged = build_package(
            self.change_set.changed(),
            self.new_tree.root(),
            &self.names.package,
        )
        .await
        .context(PackageSnafu)?;
        report::step(format!("Done. ZIP contains {packaged} file(s)."));

        DeployScript {
            old_tag: self.old_tag,
            new_tag: self.new_tag,
            removed_list: has_removed.then_some(self.names.removed.as_path()),
            mode: DeployMode::Full {
                package: &self.names.package,
                manifest: &self.names.manifest,
            },
            target: &self.release_config.deploy,
        }
        .write(&self.names.deploy_script)
        .await
        .context(DeployScriptSnafu)?;
        report::step(format!(
            "Deployment script generated: {}",
            self.names.deploy_script.display()
        ));

        if self.app_config.summary {
            let summary = PatchSummary {
                release_name: &self.release_config.source.release_name,
                old_tag: self.old_tag,
                new_tag: self.new_tag,
                old_file_count: old_files,
                new_file_count: new_files,
                change_set: self.change_set,
            };
            write_text(&self.names.summary, summary.render())
                .await
                .context(OutputSnafu)?;
            report::step(format!("Release summary saved to {}", self.names.summary.display()));
        }

        info!("Patch {} is ready", self.names.package.display());
        Ok(())
    }

    async fn write_removed_list(&self) -> Result<(), ApplicationError> {
        write_path_list(&self.names.removed, self.change_set.removed())
            .await
            .context(OutputSnafu)?;
        report::step(format!(
            "Removed files found, list saved to {}",
            self.names.removed.display()
        ));
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading release settings"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Failed to create a temporary workspace"))]
    WorkspaceError { source: std::io::Error },
    #[snafu(display("Failed to retrieve a release"))]
    SourceError { source: SourceError },
    #[snafu(display("Failed to expand a release archive"))]
    ExtractError { source: ExtractError },
    #[snafu(display("Failed to compare the release trees"))]
    CompareError { source: CompareError },
    #[snafu(display("Failed to count release files"))]
    CountError { source: TreeError },
    #[snafu(display("Failed to write an output file"))]
    OutputError { source: WriteError },
    #[snafu(display("Failed to build the patch archive"))]
    PackageError { source: PackageError },
    #[snafu(display("Failed to generate the deployment script"))]
    DeployScriptError { source: DeployScriptError },
    #[snafu(display("Failed to generate the WinSCP script"))]
    WinscpError { source: WinscpScriptError },
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::process::ExternalCommand;

    fn runtime_config(old: &str, new: Option<&str>, output: PathBuf) -> RuntimeConfig {
        RuntimeConfig {
            old_tag: old.to_string(),
            new_tag: new.map(str::to_string),
            output: Some(output),
            verify_tls: true,
            summary: false,
            only_removed: false,
            winscp: false,
            old_archive: ArchiveOrigin::Download,
            new_archive: ArchiveOrigin::Download,
            config_path: None,
        }
    }

    /// Zips `files` under a single `folder`, the way release archives are laid out.
    async fn release_archive(dir: &Path, folder: &str, files: &[(&str, &str)]) -> PathBuf {
        let staging = dir.join(format!("{folder}-staging"));
        for (relative, contents) in files {
            let path = staging.join(folder).join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        let archive = dir.join(format!("{folder}.zip"));
        ExternalCommand::new("zip")
            .args(["-q", "-r"])
            .arg(&archive)
            .arg(folder)
            .current_dir(&staging)
            .run()
            .await
            .unwrap();
        archive
    }

    /// Local archives for 1.8 and 1.9 plus a config file, all inside `dir`.
    async fn local_run(
        dir: &Path,
        old_files: &[(&str, &str)],
        new_files: &[(&str, &str)],
    ) -> RuntimeConfig {
        let config_path = dir.join("release.yaml");
        std::fs::write(
            &config_path,
            format!(
                "source:\n  release_name: Demo\n\
                 deploy:\n  target_dir: /srv/demo\n  remote_user: deployer\n  remote_host: demo.example.org\n\
                 winscp:\n  host: sftp.example.org\n  user: backup\n  backup_dir: {}\n",
                dir.join("backup").display()
            ),
        )
        .unwrap();

        let mut config = runtime_config("1.8", Some("1.9"), dir.join("out").join("patch.zip"));
        config.old_archive =
            ArchiveOrigin::Local(release_archive(dir, "demo-1.8", old_files).await);
        config.new_archive =
            ArchiveOrigin::Local(release_archive(dir, "demo-1.9", new_files).await);
        config.config_path = Some(config_path);
        config
    }

    const OLD_FILES: &[(&str, &str)] = &[("a.txt", "1"), ("b.txt", "2"), ("dir/x.txt", "x")];
    const NEW_FILES: &[(&str, &str)] = &[
        ("a.txt", "9"),
        ("-T.txt", "looks like a flag"),
        ("dir/x.txt", "x"),
        ("newdir/c.txt", "c"),
    ];

    #[compio::test]
    async fn identical_tags_produce_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let package = temp_dir.path().join("patch.zip");

        Application::run(runtime_config("1.9", Some("1.9"), package.clone()))
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[compio::test]
    async fn unreadable_local_archive_fails_fast() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = runtime_config("1.8", Some("1.9"), temp_dir.path().join("patch.zip"));
        config.old_archive = ArchiveOrigin::Local(temp_dir.path().join("missing-old.zip"));

        let result = Application::run(config).await;
        assert!(matches!(result, Err(ApplicationError::ExtractError { .. })));
    }

    #[cfg(unix)]
    #[compio::test]
    async fn local_archives_produce_full_patch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = local_run(temp_dir.path(), OLD_FILES, NEW_FILES).await;
        config.summary = true;
        let out = temp_dir.path().join("out");

        Application::run(config).await.unwrap();

        let manifest = std::fs::read_to_string(out.join("patch.txt")).unwrap();
        assert_eq!(manifest, "-T.txt\na.txt\nnewdir/c.txt\n");
        let removed = std::fs::read_to_string(out.join("patch.removed.txt")).unwrap();
        assert_eq!(removed, "b.txt\n");

        let listing = ExternalCommand::new("unzip")
            .arg("-Z1")
            .arg(out.join("patch.zip"))
            .capture()
            .await
            .unwrap();
        let mut entries = listing.lines().collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, ["-T.txt", "a.txt", "newdir/c.txt"]);

        let script = std::fs::read_to_string(out.join("Demo-deploy-1.8-to-1.9.sh")).unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains(&format!("ZIP_FILE=\"{}\"", out.join("patch.zip").display())));
        assert!(script.contains(&format!("MANIFEST=\"{}\"", out.join("patch.txt").display())));
        assert!(script.contains(&format!(
            "REMOVED_MANIFEST=\"{}\"",
            out.join("patch.removed.txt").display()
        )));
        assert!(script.contains("TARGET_DIR=\"/srv/demo\""));
        assert!(script.contains("REMOTE_HOST=\"demo.example.org\""));

        let summary = std::fs::read_to_string(out.join("patch.summary.txt")).unwrap();
        assert!(summary.starts_with("# Demo Patch Summary (from 1.8 version to 1.9)\n"));
        assert!(summary.contains("Number of files in OLD: 3\n"));
        assert!(summary.contains("Number of files in NEW: 4\n"));
        assert!(summary.contains("Number of files in generated patch ZIP: 3\n"));
        assert!(summary.ends_with("Removed files:\nb.txt\n"));
    }

    #[cfg(unix)]
    #[compio::test]
    async fn identical_archives_write_no_outputs() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = local_run(temp_dir.path(), OLD_FILES, OLD_FILES).await;

        Application::run(config).await.unwrap();

        assert!(!temp_dir.path().join("out").exists());
    }

    #[cfg(unix)]
    #[compio::test]
    async fn only_removed_writes_removal_outputs() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = local_run(temp_dir.path(), OLD_FILES, NEW_FILES).await;
        config.only_removed = true;
        config.winscp = true;
        let out = temp_dir.path().join("out");

        Application::run(config).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(out.join("patch.removed.txt")).unwrap(),
            "b.txt\n"
        );
        assert!(!out.join("patch.zip").exists());
        assert!(!out.join("patch.txt").exists());

        let script = std::fs::read_to_string(out.join("Demo-deploy-1.8-to-1.9.sh")).unwrap();
        assert!(script.contains("ssh \"$REMOTE_USER@$REMOTE_HOST\" \"rm -f '$TARGET_DIR/$file'\""));
        assert!(!script.contains("ZIP_FILE="));

        let winscp = std::fs::read_to_string(out.join("patch.removed.winscp.txt")).unwrap();
        assert!(winscp.contains("open sftp://backup@sftp.example.org/\n"));
        assert!(winscp.contains("get \"b.txt\" \"b.txt\"\n"));
        assert!(winscp.contains("rm \"b.txt\"\n"));
        assert!(temp_dir.path().join("backup").is_dir());
    }

    #[cfg(unix)]
    #[compio::test]
    async fn only_removed_without_removals_writes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = local_run(temp_dir.path(), OLD_FILES, OLD_FILES).await;
        config.only_removed = true;

        Application::run(config).await.unwrap();

        assert!(!temp_dir.path().join("out").exists());
    }
}
