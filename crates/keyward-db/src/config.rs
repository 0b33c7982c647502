//! # Store Configuration
//!
//! Where database files live and how the single connection behaves.
//!
//! ## File Layout
//! ```text
//! <base_dir>/
//! ├── main.sqlite3                            ← LicenseStore::open(config, "main")
//! ├── staging.sqlite3                         ← LicenseStore::open(config, "staging")
//! └── backup_main_20261016T120000Z.sqlite3    ← store.backup()
//! ```
//!
//! Configuration is passed to [`crate::LicenseStore::open`] explicitly;
//! nothing is read from process-wide state except by [`StoreConfig::from_env`].

use sqlx::sqlite::SqliteJournalMode;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default directory for database files, relative to the working directory.
pub const DEFAULT_BASE_DIR: &str = "databases";

/// Default file extension (without the dot).
pub const DEFAULT_EXTENSION: &str = "sqlite3";

/// Default prefix for backup file names.
pub const DEFAULT_BACKUP_PREFIX: &str = "backup";

/// License store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = StoreConfig::new("/var/lib/keyward")
///     .extension("db")
///     .busy_timeout(Duration::from_secs(2));
/// let store = LicenseStore::open(config, "main").await?;
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one file per logical database name.
    pub base_dir: PathBuf,

    /// File extension, without the leading dot.
    /// Default: "sqlite3"
    pub extension: String,

    /// Prefix for files written by `backup()`.
    /// Default: "backup"
    pub backup_prefix: String,

    /// How long an operation waits for the connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long SQLite waits on a locked file before failing.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Journal mode applied to every connection.
    /// Default: WAL
    pub journal_mode: SqliteJournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::new(DEFAULT_BASE_DIR)
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            base_dir: base_dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            journal_mode: SqliteJournalMode::Wal,
        }
    }

    /// Sets the file extension. A leading dot is stripped.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Sets the backup file prefix.
    pub fn backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }

    /// Sets the connection acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the journal mode.
    pub fn journal_mode(mut self, mode: SqliteJournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Path of the database file for a logical name: `<base_dir>/<name>.<ext>`.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(self.file_name(name))
    }

    /// Path of a backup file for `name` taken at `stamp`.
    pub fn backup_path(&self, name: &str, stamp: &str) -> PathBuf {
        self.base_dir
            .join(self.file_name(&format!("{}_{}_{}", self.backup_prefix, name, stamp)))
    }

    fn file_name(&self, stem: &str) -> String {
        if self.extension.is_empty() {
            stem.to_string()
        } else {
            format!("{}.{}", stem, self.extension)
        }
    }

    /// Loads configuration from environment variables with fallback to defaults.
    ///
    /// | Variable                       | Default     |
    /// |--------------------------------|-------------|
    /// | `KEYWARD_DB_DIR`               | `databases` |
    /// | `KEYWARD_DB_EXTENSION`         | `sqlite3`   |
    /// | `KEYWARD_BACKUP_PREFIX`        | `backup`    |
    /// | `KEYWARD_CONNECT_TIMEOUT_SECS` | `30`        |
    /// | `KEYWARD_BUSY_TIMEOUT_MS`      | `5000`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`], reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = lookup("KEYWARD_DB_DIR").unwrap_or_else(|| DEFAULT_BASE_DIR.to_string());
        if base_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue("KEYWARD_DB_DIR".to_string()));
        }

        let mut config = StoreConfig::new(base_dir);

        if let Some(extension) = lookup("KEYWARD_DB_EXTENSION") {
            config = config.extension(extension);
        }

        if let Some(prefix) = lookup("KEYWARD_BACKUP_PREFIX") {
            config = config.backup_prefix(prefix);
        }

        if let Some(secs) = lookup("KEYWARD_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| ConfigError::InvalidValue("KEYWARD_CONNECT_TIMEOUT_SECS".to_string()))?;
            config = config.connect_timeout(Duration::from_secs(secs));
        }

        if let Some(ms) = lookup("KEYWARD_BUSY_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| ConfigError::InvalidValue("KEYWARD_BUSY_TIMEOUT_MS".to_string()))?;
            config = config.busy_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
