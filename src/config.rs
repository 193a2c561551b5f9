//! Settings file holding the connection string and workload sizes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::runner::DEFAULT_TAKE;
use crate::seed::DEFAULT_CONTACTS;
use crate::store::ConnectionString;

/// Store used when neither the settings file nor the command line names one.
pub const DEFAULT_DATA_SOURCE: &str = "ctxbench.db";

/// How much work a run does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Workload {
    /// Contacts inserted while seeding.
    pub contacts: usize,
    /// Contacts processed by each benchmark run.
    pub take: usize,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            contacts: DEFAULT_CONTACTS,
            take: DEFAULT_TAKE,
        }
    }
}

/// Resolved settings.
#[derive(Clone, Debug)]
pub struct Config {
    path: Option<PathBuf>,
    connection_string: ConnectionString,
    workload: Workload,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            connection_string: ConnectionString::from_path(DEFAULT_DATA_SOURCE),
            workload: Workload::default(),
        }
    }
}

impl Config {
    /// Loads `explicit`, or the default settings file when `None`.
    ///
    /// A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let mut config = convert(path.as_deref(), raw)?;
        config.path = path;
        Ok(config)
    }

    /// Replaces the connection string, e.g. from a command line override.
    pub fn with_connection_string(mut self, connection_string: ConnectionString) -> Self {
        self.connection_string = connection_string;
        self
    }

    /// Settings file consulted, whether or not it existed.
    pub fn source(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Store the providers connect to.
    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    /// Workload sizes.
    pub fn workload(&self) -> Workload {
        self.workload
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn convert(path: Option<&Path>, raw: RawConfig) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    if let Some(value) = raw.connection_string {
        config.connection_string = value.parse().map_err(|err: crate::Error| {
            ConfigError::ConnectionString {
                path: path.map(Path::to_path_buf).unwrap_or_default(),
                reason: err.to_string(),
            }
        })?;
    }
    if let Some(contacts) = raw.workload.contacts {
        config.workload.contacts = contacts;
    }
    if let Some(take) = raw.workload.take {
        config.workload.take = take;
    }
    Ok(config)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    connection_string: Option<String>,
    #[serde(default)]
    workload: RawWorkload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkload {
    contacts: Option<usize>,
    take: Option<usize>,
}

/// Errors raised while loading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// The `connection_string` entry is malformed.
    #[error("config {path}: {reason}")]
    ConnectionString {
        /// File that failed.
        path: PathBuf,
        /// What was wrong with the value.
        reason: String,
    },
}

/// `<config dir>/ctxbench/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("ctxbench").join("config.toml"))
}
