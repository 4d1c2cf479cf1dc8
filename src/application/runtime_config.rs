use std::path::PathBuf;

use crate::cli::Cli;

/// Where a release archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOrigin {
    Download,
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub old_tag: String,
    pub new_tag: Option<String>,
    pub output: Option<PathBuf>,
    pub verify_tls: bool,
    pub summary: bool,
    pub only_removed: bool,
    pub winscp: bool,
    pub old_archive: ArchiveOrigin,
    pub new_archive: ArchiveOrigin,
    pub config_path: Option<PathBuf>,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        let origin = |path: Option<PathBuf>| path.map_or(ArchiveOrigin::Download, ArchiveOrigin::Local);

        Self {
            old_tag: cli.old,
            new_tag: cli.new,
            output: cli.output,
            verify_tls: !cli.no_verify,
            summary: cli.summary,
            only_removed: cli.only_removed,
            winscp: cli.winscp,
            old_archive: origin(cli.old_archive),
            new_archive: origin(cli.new_archive),
            config_path: cli.config,
        }
    }
}
