use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Builds an incremental upgrade package between two releases.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Tag of the starting release (e.g. 1.8.10)
    #[clap(long)]
    pub old: String,

    /// Tag of the target release; the latest published release when omitted
    #[clap(long)]
    pub new: Option<String>,

    /// Output ZIP filename (default: <RELEASE>-update-<OLD>-to-<NEW>.zip)
    #[clap(long)]
    pub output: Option<PathBuf>,

    /// Disable TLS certificate verification (not recommended)
    #[clap(long)]
    pub no_verify: bool,

    /// Write a summary text file with patch details
    #[clap(long)]
    pub summary: bool,

    /// Only write the removed-files list and a removal deploy script
    #[clap(long)]
    pub only_removed: bool,

    /// Write a WinSCP script that backs up and deletes the removed files
    #[clap(long, requires = "only_removed")]
    pub winscp: bool,

    /// Use a local archive of the old release instead of downloading it
    #[clap(long)]
    pub old_archive: Option<PathBuf>,

    /// Use a local archive of the new release instead of downloading it
    #[clap(long)]
    pub new_archive: Option<PathBuf>,

    /// Release settings file (default: ./release-delta.yaml when present)
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,
}
