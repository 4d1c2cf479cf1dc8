use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use compio::runtime::spawn_blocking;
use reqwest::blocking::Client;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::ext::BestEffortPathExt;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const API_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Subset of a release API answer.
#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Fetches release metadata and archives over HTTP.
#[derive(Debug, Clone)]
pub struct ReleaseSource {
    config: SourceConfig,
    verify_tls: bool,
}

impl ReleaseSource {
    pub fn new(config: SourceConfig, verify_tls: bool) -> Self {
        Self { config, verify_tls }
    }

    /// Tag name of the most recent published release.
    pub async fn latest_tag(&self) -> Result<String, SourceError> {
        let url = self.config.latest_release_api.clone();
        debug!("Resolving latest release from {url}");

        let verify_tls = self.verify_tls;
        let task_url = url.clone();
        let body = spawn_blocking(move || fetch_text(&task_url, verify_tls))
            .await
            .ok()
            .context(BlockingTaskSnafu { url: url.clone() })?
            .context(HttpSnafu { url: url.clone() })?;

        parse_latest_tag(&body).context(LatestTagSnafu { url })
    }

    /// Downloads the archive of `tag` to `dest`.
    pub async fn download(&self, tag: &str, dest: &Path) -> Result<PathBuf, SourceError> {
        let url = self.config.archive_url_for(tag);
        info!("Downloading {tag} from {url}");

        let verify_tls = self.verify_tls;
        let task_url = url.clone();
        let task_dest = dest.to_path_buf();
        let bytes = spawn_blocking(move || fetch_to_file(&task_url, &task_dest, verify_tls))
            .await
            .ok()
            .context(BlockingTaskSnafu { url: url.clone() })??;

        debug!("Saved {bytes} bytes to {}", dest.best_effort_path_display());
        Ok(dest.to_path_buf())
    }
}

fn client(verify_tls: bool, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!verify_tls)
        .timeout(timeout)
        .build()
}

fn fetch_text(url: &str, verify_tls: bool) -> reqwest::Result<String> {
    let resp = client(verify_tls, API_TIMEOUT)?
        .get(url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()?
        .error_for_status()?;
    resp.text()
}

fn fetch_to_file(url: &str, dest: &Path, verify_tls: bool) -> Result<u64, SourceError> {
    let mut resp = client(verify_tls, DOWNLOAD_TIMEOUT)
        .and_then(|client| client.get(url).send())
        .and_then(|resp| resp.error_for_status())
        .context(HttpSnafu { url })?;

    let mut file = File::create(dest).context(SaveSnafu {
        path: dest.to_path_buf(),
    })?;
    resp.copy_to(&mut file).context(HttpSnafu { url })
}

fn parse_latest_tag(body: &str) -> Result<String, serde_json::Error> {
    serde_json::from_str::<LatestRelease>(body).map(|release| release.tag_name)
}

#[derive(Debug, Snafu)]
pub enum SourceError {
    #[snafu(display("Failed to fetch {}", url))]
    HttpError { url: String, source: reqwest::Error },
    #[snafu(display("Failed to save download to {}", path.best_effort_path_display()))]
    SaveError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Request to {} was aborted", url))]
    BlockingTaskError { url: String },
    #[snafu(display("Response from {} carries no usable tag_name", url))]
    LatestTagError {
        url: String,
        source: serde_json::Error,
    },
}
