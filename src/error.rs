use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::model::ContactId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sessions, providers and the benchmark harness.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// I/O error while touching the store files or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A single-row lookup matched zero or several rows.
    #[error("expected exactly one contact with id {id}, found {found}")]
    NotSingle {
        /// Requested contact id.
        id: ContactId,
        /// Number of rows that matched.
        found: usize,
    },
    /// A shared session was requested while a handle to it is still alive.
    #[error("session is already in use")]
    SessionBusy,
    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    /// Settings file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
