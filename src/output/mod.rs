//! Everything written after a comparison: path lists, the patch archive,
//! the summary, deployment scripts and the console report.

mod artifact_names;
mod deploy_script;
mod package;
mod path_list;
pub mod report;
mod summary;
mod winscp_script;

pub use artifact_names::ArtifactNames;
pub use deploy_script::{DeployMode, DeployScript, DeployScriptError};
pub use package::{PackageError, build_package};
pub use path_list::{WriteError, write_path_list, write_text};
pub use summary::PatchSummary;
pub use winscp_script::{WinscpScript, WinscpScriptError};
