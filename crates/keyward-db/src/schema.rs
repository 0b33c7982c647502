//! # Schema Bootstrap
//!
//! Creates the three licensing tables in a brand-new database file.
//!
//! ## When Bootstrap Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LicenseStore::open                                 │
//! │                                                                         │
//! │  <base_dir>/<name>.<ext> exists?                                       │
//! │       │                                                                 │
//! │       ├── no  → connect (create) → BEGIN                               │
//! │       │                            CREATE TABLE GUILDS                 │
//! │       │                            CREATE TABLE LICENSED_MEMBERS       │
//! │       │                            CREATE TABLE GUILD_LICENSES         │
//! │       │                            COMMIT                              │
//! │       │         failure? → close + delete the file                     │
//! │       │                                                                 │
//! │       └── yes → connect (no create) → prepare_existing()               │
//! │                 ├── no tables at all → bootstrap (as above)            │
//! │                 └── otherwise → verify_schema(), used as-is            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An existing file with no tables is what a crash between file creation and
//! `COMMIT` leaves behind (SQLite rolls the open transaction back on the next
//! connect). It is treated as uninitialized rather than foreign.
//!
//! The column set, types and constraints are the on-disk contract with
//! existing data files. Do not change them without a migration story.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

/// Per-guild settings.
const CREATE_GUILDS: &str = "CREATE TABLE GUILDS (\
    GUILD_ID TEXT PRIMARY KEY, \
    PREFIX TEXT CHECK(PREFIX IS NULL OR LENGTH(PREFIX) <= 3), \
    ENABLE_LOG_CHANNEL TINYINT DEFAULT 0, \
    LOG_CHANNEL_ID TEXT, \
    ENABLE_JOIN_ROLE TINYINT DEFAULT 0, \
    JOIN_ROLE_ID TEXT, \
    DEFAULT_LICENSE_ROLE_ID TEXT, \
    DEFAULT_LICENSE_DURATION_HOURS UNSIGNED BIG INT DEFAULT 720\
)";

/// Active role grants, one per member and guild.
const CREATE_LICENSED_MEMBERS: &str = "CREATE TABLE LICENSED_MEMBERS (\
    MEMBER_ID TEXT, \
    GUILD_ID TEXT, \
    EXPIRATION_DATE DATE, \
    LICENSED_ROLE_ID TEXT, \
    UNIQUE(MEMBER_ID, GUILD_ID)\
)";

/// Issued codes awaiting redemption.
const CREATE_GUILD_LICENSES: &str = "CREATE TABLE GUILD_LICENSES (\
    LICENSE TEXT PRIMARY KEY, \
    GUILD_ID TEXT, \
    LICENSED_ROLE_ID TEXT, \
    UNIQUE(LICENSE, GUILD_ID)\
)";

/// Tables in creation order.
pub const TABLES: [(&str, &str); 3] = [
    ("GUILDS", CREATE_GUILDS),
    ("LICENSED_MEMBERS", CREATE_LICENSED_MEMBERS),
    ("GUILD_LICENSES", CREATE_GUILD_LICENSES),
];

/// Creates every table in one transaction.
///
/// Either all three tables exist afterwards or none do. Fails if any of the
/// tables already exists.
pub async fn bootstrap(pool: &SqlitePool) -> DbResult<()> {
    info!("Bootstrapping fresh licensing schema");

    let mut tx = pool.begin().await?;

    for (table, ddl) in TABLES {
        debug!(table = %table, "Creating table");
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    info!("Schema created");
    Ok(())
}

/// Readies a database file that existed before open.
///
/// ## Returns
/// * `Ok(())` - The file was empty and is now bootstrapped, or it already
///   holds the licensing tables
/// * `Err(DbError::StorageUnavailable)` - Unreadable, partially initialized,
///   or some other application's database
pub async fn prepare_existing(pool: &SqlitePool) -> DbResult<()> {
    let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
        .fetch_one(pool)
        .await?;

    if tables == 0 {
        warn!("Existing database has no tables, bootstrapping");
        return bootstrap(pool).await;
    }

    verify_schema(pool).await
}

/// Confirms an existing file holds the licensing tables.
///
/// This is also the first real read of the file, so a corrupt or non-SQLite
/// file fails here with `StorageUnavailable` instead of on first use.
pub async fn verify_schema(pool: &SqlitePool) -> DbResult<()> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2, ?3)",
    )
    .bind(TABLES[0].0)
    .bind(TABLES[1].0)
    .bind(TABLES[2].0)
    .fetch_all(pool)
    .await?;

    let missing: Vec<&str> = TABLES
        .iter()
        .map(|(table, _)| *table)
        .filter(|table| !present.iter().any(|p| p == table))
        .collect();

    if !missing.is_empty() {
        return Err(DbError::StorageUnavailable(format!(
            "database is missing tables: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_all_tables() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();
        verify_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_twice_fails() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();
        assert!(bootstrap(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_reports_missing_tables() {
        let pool = memory_pool().await;
        sqlx::query(CREATE_GUILDS).execute(&pool).await.unwrap();

        let err = verify_schema(&pool).await.unwrap_err();
        match err {
            DbError::StorageUnavailable(msg) => {
                assert!(msg.contains("LICENSED_MEMBERS"));
                assert!(msg.contains("GUILD_LICENSES"));
                assert!(!msg.contains("GUILDS,"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_existing_bootstraps_empty_database() {
        let pool = memory_pool().await;
        prepare_existing(&pool).await.unwrap();
        verify_schema(&pool).await.unwrap();

        // Second pass only verifies
        prepare_existing(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_existing_rejects_partial_or_foreign() {
        let pool = memory_pool().await;
        sqlx::query(CREATE_GUILDS).execute(&pool).await.unwrap();
        assert!(prepare_existing(&pool).await.unwrap_err().is_unavailable());

        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE unrelated (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(prepare_existing(&pool).await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_prefix_check_constraint() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();

        sqlx::query("INSERT INTO GUILDS (GUILD_ID, PREFIX) VALUES ('1', '!!!')")
            .execute(&pool)
            .await
            .unwrap();

        let err: DbError = sqlx::query("INSERT INTO GUILDS (GUILD_ID, PREFIX) VALUES ('2', '!!!!')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_guild_defaults() {
        let pool = memory_pool().await;
        bootstrap(&pool).await.unwrap();

        sqlx::query("INSERT INTO GUILDS (GUILD_ID) VALUES ('1')")
            .execute(&pool)
            .await
            .unwrap();

        let (log, join, hours): (i64, i64, i64) = sqlx::query_as(
            "SELECT ENABLE_LOG_CHANNEL, ENABLE_JOIN_ROLE, DEFAULT_LICENSE_DURATION_HOURS \
             FROM GUILDS WHERE GUILD_ID = '1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!((log, join, hours), (0, 0, 720));
    }
}
