mod release_config;

pub use release_config::{ConfigError, DeployConfig, ReleaseConfig, SourceConfig, WinscpConfig};
