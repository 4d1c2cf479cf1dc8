use std::path::{Path, PathBuf};

/// File names of everything one run can produce.
///
/// Every file lands next to the package, which defaults to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub package: PathBuf,
    pub manifest: PathBuf,
    pub removed: PathBuf,
    pub summary: PathBuf,
    pub winscp: PathBuf,
    pub deploy_script: PathBuf,
}

impl ArtifactNames {
    pub fn new(output: Option<&Path>, release_name: &str, old_tag: &str, new_tag: &str) -> Self {
        let package = output.map(Path::to_path_buf).unwrap_or_else(|| {
            PathBuf::from(format!("{release_name}-update-{old_tag}-to-{new_tag}.zip"))
        });
        let base = package.with_extension("");
        let deploy_script = package
            .parent()
            .unwrap_or(Path::new(""))
            .join(format!("{release_name}-deploy-{old_tag}-to-{new_tag}.sh"));
        let with_suffix = |suffix: &str| {
            let mut name = base.clone().into_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };

        Self {
            manifest: with_suffix(".txt"),
            removed: with_suffix(".removed.txt"),
            summary: with_suffix(".summary.txt"),
            winscp: with_suffix(".removed.winscp.txt"),
            deploy_script,
            package,
        }
    }
}
