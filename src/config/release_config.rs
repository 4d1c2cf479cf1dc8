use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::ext::BestEffortPathExt;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "release-delta.yaml";

const DEFAULT_ARCHIVE_URL: &str = "https://github.com/YOURLS/YOURLS/archive/refs/tags/{tag}.zip";
const DEFAULT_LATEST_RELEASE_API: &str = "https://api.github.com/repos/YOURLS/YOURLS/releases/latest";
const DEFAULT_RELEASE_NAME: &str = "YOURLS";
const DEFAULT_TARGET_DIR: &str = "/var/www/yourls";
const DEFAULT_REMOTE_USER: &str = "user";
const DEFAULT_REMOTE_HOST: &str = "yourserver.com";
const DEFAULT_WINSCP_USER: &str = "youruser";
const DEFAULT_BACKUP_DIR: &str = "removed_backup";

/// Where releases come from and what generated files are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Archive download URL, `{tag}` is replaced with the release tag.
    pub archive_url: String,
    /// Endpoint answering with a JSON object carrying `tag_name`.
    pub latest_release_api: String,
    /// Prefix of generated file names, e.g. `YOURLS-update-1.8-to-1.9.zip`.
    pub release_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            latest_release_api: DEFAULT_LATEST_RELEASE_API.to_string(),
            release_name: DEFAULT_RELEASE_NAME.to_string(),
        }
    }
}

impl SourceConfig {
    pub fn archive_url_for(&self, tag: &str) -> String {
        self.archive_url.replace("{tag}", tag)
    }
}

/// Remote target baked into the generated deployment script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub target_dir: String,
    pub remote_user: String,
    pub remote_host: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            target_dir: DEFAULT_TARGET_DIR.to_string(),
            remote_user: DEFAULT_REMOTE_USER.to_string(),
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinscpConfig {
    pub remote_base_path: String,
    pub host: String,
    pub user: String,
    pub backup_dir: PathBuf,
}

impl Default for WinscpConfig {
    fn default() -> Self {
        Self {
            remote_base_path: DEFAULT_TARGET_DIR.to_string(),
            host: DEFAULT_REMOTE_HOST.to_string(),
            user: DEFAULT_WINSCP_USER.to_string(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub source: SourceConfig,
    pub deploy: DeployConfig,
    pub winscp: WinscpConfig,
}

impl ReleaseConfig {
    /// Reads `path` if given, otherwise the default file in the working directory.
    ///
    /// Only the default file may be absent, in which case built-in defaults apply.
    pub async fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path).await,
            None => match Self::from_path(Path::new(DEFAULT_CONFIG_FILE_NAME)).await {
                Err(ConfigError::ReadError { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    info!("No {DEFAULT_CONFIG_FILE_NAME} found, using built-in release settings");
                    Ok(Self::default())
                }
                other => other,
            },
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config file: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }
}

impl TryFrom<&str> for ReleaseConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().ok_or(ConfigError::MalformedConfig)?;
        let top_level = document.as_mapping().ok_or(ConfigError::TopLevelNotMap)?;

        let mut config = ReleaseConfig::default();

        if let Some(source) = section(top_level, "source")? {
            assign(source, "source", "archive_url", &mut config.source.archive_url)?;
            assign(
                source,
                "source",
                "latest_release_api",
                &mut config.source.latest_release_api,
            )?;
            assign(source, "source", "release_name", &mut config.source.release_name)?;
        }

        if let Some(deploy) = section(top_level, "deploy")? {
            assign(deploy, "deploy", "target_dir", &mut config.deploy.target_dir)?;
            assign(deploy, "deploy", "remote_user", &mut config.deploy.remote_user)?;
            assign(deploy, "deploy", "remote_host", &mut config.deploy.remote_host)?;
        }

        if let Some(winscp) = section(top_level, "winscp")? {
            assign(
                winscp,
                "winscp",
                "remote_base_path",
                &mut config.winscp.remote_base_path,
            )?;
            assign(winscp, "winscp", "host", &mut config.winscp.host)?;
            assign(winscp, "winscp", "user", &mut config.winscp.user)?;
            if let Some(backup_dir) = string_value(winscp, "winscp", "backup_dir")? {
                config.winscp.backup_dir = PathBuf::from(backup_dir);
            }
        }

        ensure!(
            config.source.archive_url.contains("{tag}"),
            MissingTagPlaceholderSnafu {
                url: config.source.archive_url.clone(),
            }
        );

        Ok(config)
    }
}

type YamlMap<'a> = LinkedHashMap<Yaml<'a>, Yaml<'a>>;

fn key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

fn section<'a, 'input>(
    top_level: &'a YamlMap<'input>,
    name: &'static str,
) -> Result<Option<&'a YamlMap<'input>>, ConfigError> {
    match top_level.get(&key(name)) {
        None | Some(Yaml::Value(Scalar::Null)) => Ok(None),
        Some(value) => value
            .as_mapping()
            .map(Some)
            .context(SectionNotMapSnafu { section: name }),
    }
}

fn string_value(
    section: &YamlMap<'_>,
    section_name: &'static str,
    name: &'static str,
) -> Result<Option<String>, ConfigError> {
    match section.get(&key(name)) {
        None | Some(Yaml::Value(Scalar::Null)) => Ok(None),
        Some(value) => value.as_str().map(|s| Some(s.to_string())).context(NotAStringSnafu {
            section: section_name,
            key: name,
        }),
    }
}

fn assign(
    section: &YamlMap<'_>,
    section_name: &'static str,
    name: &'static str,
    target: &mut String,
) -> Result<(), ConfigError> {
    if let Some(value) = string_value(section, section_name, name)? {
        *target = value;
    }
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Section '{}' should be a map", section))]
    SectionNotMap { section: String },
    #[snafu(display("Value '{}.{}' should be a string", section, key))]
    NotAString { section: String, key: String },
    #[snafu(display("Archive URL '{}' has no {{tag}} placeholder", url))]
    MissingTagPlaceholder { url: String },
}
