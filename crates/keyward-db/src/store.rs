//! # License Store
//!
//! Opens (or bootstraps) a database file and hands out repositories that
//! share its single connection.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LicenseStore                                    │
//! │                                                                         │
//! │  Bot startup                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreConfig::from_env() ← base dir, extension, timeouts               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LicenseStore::open(config, "main").await                              │
//! │       │   resolve <base_dir>/main.sqlite3                              │
//! │       │   missing or empty? → bootstrap   present? → verify schema     │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │   SqlitePool (max_connections = 1)      │                           │
//! │  │          ┌───────┐                      │                           │
//! │  │          │ Conn  │ ← every query and    │                           │
//! │  │          └───────┘   transaction queues │                           │
//! │  └─────────────────────────────────────────┘   here, one at a time     │
//! │       ▲           ▲            ▲                                        │
//! │  guilds()    licenses()    members()                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! SQLite does not tolerate concurrent writers well, so the pool is capped at
//! one connection. A transaction holds that connection until it commits or
//! rolls back, which makes redemption of a given code at-most-once even when
//! many tasks race for it.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use keyward_core::{LicenseGenerator, RandomLicenseGenerator};

use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};
use crate::repository::guild::GuildRepository;
use crate::repository::license::LicenseRepository;
use crate::repository::member::MemberRepository;
use crate::schema;

/// Files SQLite may leave next to the database.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Handle to one licensing database file.
///
/// Cloning is cheap; clones share the connection. Closing any clone closes
/// them all.
#[derive(Clone)]
pub struct LicenseStore {
    pool: SqlitePool,
    name: String,
    path: PathBuf,
    config: StoreConfig,
    generator: Arc<dyn LicenseGenerator>,
}

impl fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("closed", &self.pool.is_closed())
            .finish_non_exhaustive()
    }
}

impl LicenseStore {
    /// Opens the database called `name`, creating it if needed.
    ///
    /// ## What This Does
    /// 1. Resolves `<base_dir>/<name>.<extension>` and creates `base_dir`
    /// 2. Opens a single connection (WAL, NORMAL sync, busy timeout)
    /// 3. New file: creates the schema in one transaction, deleting the file
    ///    again if that fails
    /// 4. Existing file: bootstraps it if it has no tables at all, otherwise
    ///    checks the three tables are present
    ///
    /// ## Returns
    /// * `Ok(LicenseStore)` - Ready-to-use handle
    /// * `Err(DbError::StorageUnavailable)` - Directory unwritable, file
    ///   corrupt or not a licensing database
    /// * `Err(DbError::InvalidData)` - `name` is not a plain file stem
    pub async fn open(config: StoreConfig, name: &str) -> DbResult<Self> {
        validate_name(name)?;

        let path = config.database_path(name);
        info!(path = %path.display(), "Opening license store");

        std::fs::create_dir_all(&config.base_dir).map_err(|e| {
            DbError::StorageUnavailable(format!(
                "cannot create {}: {}",
                config.base_dir.display(),
                e
            ))
        })?;

        let fresh = !path.exists();
        if fresh {
            info!("Database not found, creating fresh");
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(fresh)
            .journal_mode(config.journal_mode)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);

        // One connection for the life of the handle
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await;

        let pool = match pool {
            Ok(pool) => pool,
            Err(err) => {
                if fresh {
                    remove_database_files(&path);
                }
                return Err(DbError::StorageUnavailable(err.to_string()));
            }
        };

        let init = if fresh {
            schema::bootstrap(&pool).await
        } else {
            schema::prepare_existing(&pool).await
        };

        if let Err(err) = init {
            pool.close().await;
            if fresh {
                remove_database_files(&path);
            }
            return Err(match err {
                DbError::StorageUnavailable(msg) => DbError::StorageUnavailable(msg),
                other => DbError::StorageUnavailable(other.to_string()),
            });
        }

        info!(name = %name, fresh, "License store ready");

        Ok(LicenseStore {
            pool,
            name: name.to_string(),
            path,
            config,
            generator: Arc::new(RandomLicenseGenerator),
        })
    }

    /// Replaces the license code generator.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let store = LicenseStore::open(config, "main")
    ///     .await?
    ///     .with_generator(MyGenerator::new());
    /// ```
    pub fn with_generator(mut self, generator: impl LicenseGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Logical database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a reference to the underlying pool.
    ///
    /// ## Usage
    /// For diagnostics not covered by repositories. Writes to the licensing
    /// tables belong in the repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the guild configuration repository.
    pub fn guilds(&self) -> GuildRepository {
        GuildRepository::new(self.pool.clone())
    }

    /// Returns the license repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let codes = store.licenses().generate_licenses(3, guild, role).await?;
    /// ```
    pub fn licenses(&self) -> LicenseRepository {
        LicenseRepository::new(self.pool.clone(), Arc::clone(&self.generator))
    }

    /// Returns the licensed member repository.
    pub fn members(&self) -> MemberRepository {
        MemberRepository::new(self.pool.clone())
    }

    /// Writes a consistent copy of the database next to it.
    ///
    /// ## Returns
    /// Path of `<base_dir>/<backup_prefix>_<name>_<UTC timestamp>.<extension>`.
    pub async fn backup(&self) -> DbResult<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let target = self.config.backup_path(&self.name, &stamp);

        info!(target = %target.display(), "Backing up license store");

        sqlx::query("VACUUM INTO ?1")
            .bind(target.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;

        Ok(target)
    }

    /// Checks if the store can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Whether `close()` has been called on this handle or a clone.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Releases the connection.
    ///
    /// Waits for in-flight operations to finish. Afterwards every operation
    /// on this handle and its clones fails with `StorageUnavailable`.
    pub async fn close(&self) {
        info!(name = %self.name, "Closing license store");
        self.pool.close().await;
    }
}

/// Rejects names that would escape `base_dir` or produce odd file names.
fn validate_name(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(DbError::invalid(
            "Database name",
            name,
            "must be non-empty and contain only letters, digits, '_' or '-'",
        ))
    }
}

/// Deletes a half-created database and its sidecar files.
fn remove_database_files(path: &Path) {
    let mut targets = vec![path.to_path_buf()];
    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        targets.push(PathBuf::from(sidecar));
    }

    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => debug!(path = %target.display(), "Removed partial database file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %target.display(), error = %e, "Could not remove partial database file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{GuildId, RoleId};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let store = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap();

        assert!(store.health_check().await);
        assert_eq!(store.path(), dir.path().join("main.sqlite3"));
        assert!(store.path().is_file());

        store.close().await;
    }

    #[tokio::test]
    async fn test_open_creates_base_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = LicenseStore::open(StoreConfig::new(&nested), "main")
            .await
            .unwrap();

        assert!(nested.join("main.sqlite3").is_file());
        store.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap();
        let clone = store.clone();

        store.close().await;

        assert!(clone.is_closed());
        assert!(!clone.health_check().await);
        let err = clone
            .licenses()
            .list_licenses(10, GuildId::new(1), RoleId::new(2))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        for name in ["", "../escape", "a/b", "main.db"] {
            let err = LicenseStore::open(StoreConfig::new(dir.path()), name)
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::InvalidData { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn test_garbage_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.sqlite3");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let err = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        // An existing file is never deleted
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_empty_existing_file_is_bootstrapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.sqlite3");
        std::fs::write(&path, b"").unwrap();

        let store = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap();
        let codes = store
            .licenses()
            .generate_licenses(1, GuildId::new(1), RoleId::new(7))
            .await
            .unwrap();
        assert_eq!(
            store.licenses().get_license_role(&codes[0]).await.unwrap(),
            RoleId::new(7)
        );
        store.close().await;

        // Reopening verifies instead of bootstrapping again
        let store = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap();
        assert_eq!(store.licenses().count_licenses(GuildId::new(1)).await.unwrap(), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_foreign_sqlite_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.sqlite3");

        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
        sqlx::query("CREATE TABLE unrelated (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let err = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_remove_database_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.sqlite3");
        std::fs::write(&path, b"").unwrap();
        std::fs::write(dir.path().join("x.sqlite3-wal"), b"").unwrap();

        remove_database_files(&path);

        assert!(!path.exists());
        assert!(!dir.path().join("x.sqlite3-wal").exists());
    }

    #[tokio::test]
    async fn test_backup() {
        let dir = TempDir::new().unwrap();
        let store = LicenseStore::open(StoreConfig::new(dir.path()), "main")
            .await
            .unwrap();
        store
            .licenses()
            .generate_licenses(2, GuildId::new(1), RoleId::new(7))
            .await
            .unwrap();

        let backup = store.backup().await.unwrap();
        assert!(backup.is_file());
        let file_name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("backup_main_"));
        assert!(file_name.ends_with(".sqlite3"));

        store.close().await;
    }
}
