//! SQLite store plumbing: connection strings, pragmas and schema.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::{Error, Result};

const SCHEMA: &str = "
    CREATE TABLE accounts (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE contacts (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        account_id INTEGER NULL REFERENCES accounts (id)
    );
    CREATE INDEX idx_contacts_account ON contacts (account_id);
";

const SIDE_FILE_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// SQLite journal mode applied when a connection is opened.
#[derive(Clone, Copy, Debug, ValueEnum, Eq, PartialEq)]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal header zeroed after each transaction.
    Persist,
    /// Rollback journal kept in memory.
    Memory,
    /// Write-ahead log.
    Wal,
    /// No journal.
    Off,
}

impl JournalMode {
    fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Persist => "persist",
            JournalMode::Memory => "memory",
            JournalMode::Wal => "wal",
            JournalMode::Off => "off",
        }
    }
}

/// SQLite `synchronous` setting applied when a connection is opened.
#[derive(Clone, Copy, Debug, ValueEnum, Eq, PartialEq)]
pub enum Synchronous {
    /// No fsync.
    Off,
    /// Fsync at critical moments only.
    Normal,
    /// Fsync on every commit.
    Full,
    /// Full plus directory sync.
    Extra,
}

impl Synchronous {
    fn as_str(self) -> &'static str {
        match self {
            Synchronous::Off => "off",
            Synchronous::Normal => "normal",
            Synchronous::Full => "full",
            Synchronous::Extra => "extra",
        }
    }
}

/// Parsed store location plus the connection settings that go with it.
///
/// Accepts either a bare file path or `;`-separated `key=value` pairs such as
/// `Data Source=bench.db;Journal Mode=WAL;Synchronous=Normal;Busy Timeout=500`.
/// Keys are case-insensitive and may contain spaces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionString {
    path: PathBuf,
    journal_mode: Option<JournalMode>,
    synchronous: Option<Synchronous>,
    busy_timeout: Option<Duration>,
}

impl ConnectionString {
    /// Connection string pointing at `path` with SQLite defaults.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal_mode: None,
            synchronous: None,
            busy_timeout: None,
        }
    }

    /// Overrides the journal mode.
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }

    /// Overrides the synchronous setting.
    pub fn with_synchronous(mut self, synchronous: Synchronous) -> Self {
        self.synchronous = Some(synchronous);
        self
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured journal mode, if any.
    pub fn journal_mode(&self) -> Option<JournalMode> {
        self.journal_mode
    }

    /// Configured synchronous setting, if any.
    pub fn synchronous(&self) -> Option<Synchronous> {
        self.synchronous
    }

    /// Configured busy timeout, if any.
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if !raw.contains('=') {
            if raw.is_empty() {
                return Err(Error::InvalidConnectionString(
                    "missing data source".to_string(),
                ));
            }
            return Ok(Self::from_path(raw));
        }

        let mut path = None;
        let mut journal_mode = None;
        let mut synchronous = None;
        let mut busy_timeout = None;
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (raw_key, value) = segment.split_once('=').ok_or_else(|| {
                Error::InvalidConnectionString(format!("expected key=value, got '{segment}'"))
            })?;
            let key: String = raw_key
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "datasource" | "path" => path = Some(PathBuf::from(value)),
                "journalmode" => {
                    journal_mode = Some(JournalMode::from_str(value, true).map_err(|_| {
                        Error::InvalidConnectionString(format!("journal mode '{value}'"))
                    })?)
                }
                "synchronous" => {
                    synchronous = Some(Synchronous::from_str(value, true).map_err(|_| {
                        Error::InvalidConnectionString(format!("synchronous '{value}'"))
                    })?)
                }
                "busytimeout" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        Error::InvalidConnectionString(format!("busy timeout '{value}'"))
                    })?;
                    busy_timeout = Some(Duration::from_millis(ms));
                }
                _ => {
                    return Err(Error::InvalidConnectionString(format!(
                        "unknown key '{}'",
                        raw_key.trim()
                    )))
                }
            }
        }

        let path = path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::InvalidConnectionString("missing data source".to_string()))?;
        Ok(Self {
            path,
            journal_mode,
            synchronous,
            busy_timeout,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data Source={}", self.path.display())?;
        if let Some(mode) = self.journal_mode {
            write!(f, ";Journal Mode={}", mode.as_str())?;
        }
        if let Some(sync) = self.synchronous {
            write!(f, ";Synchronous={}", sync.as_str())?;
        }
        if let Some(timeout) = self.busy_timeout {
            write!(f, ";Busy Timeout={}", timeout.as_millis())?;
        }
        Ok(())
    }
}

/// Opens an existing store and applies the pragmas carried by `target`.
///
/// A missing file is an error; only [`open_or_create`] brings one into being.
pub(crate) fn open(target: &ConnectionString) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    configure(Connection::open_with_flags(&target.path, flags)?, target)
}

/// Like [`open`], creating the file when it does not exist yet.
pub(crate) fn open_or_create(target: &ConnectionString) -> Result<Connection> {
    configure(Connection::open(&target.path)?, target)
}

fn configure(conn: Connection, target: &ConnectionString) -> Result<Connection> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    if let Some(mode) = target.journal_mode {
        // journal_mode reports the resulting mode as a row.
        let applied: String =
            conn.pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| row.get(0))?;
        debug!(requested = mode.as_str(), applied = %applied, "store.journal_mode");
    }
    if let Some(sync) = target.synchronous {
        conn.pragma_update(None, "synchronous", sync.as_str())?;
    }
    if let Some(timeout) = target.busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

/// Whether the database file exists.
pub(crate) fn exists(path: &Path) -> bool {
    path.exists()
}

/// Removes the database file and any journal side files.
pub(crate) fn delete(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    for suffix in SIDE_FILE_SUFFIXES {
        let side = side_file(path, suffix);
        if side.exists() {
            fs::remove_file(&side)?;
        }
    }
    debug!(path = %path.display(), "store.deleted");
    Ok(())
}

/// Creates both tables on a fresh connection.
pub(crate) fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn side_file(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
