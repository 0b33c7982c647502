//! # Guild Repository
//!
//! Per-guild settings in `GUILDS`.
//!
//! ## Lazy Rows
//! ```text
//! set_prefix(guild 42, "!k")
//!      │
//!      ▼
//! INSERT INTO GUILDS (GUILD_ID, PREFIX) VALUES ('42', '!k')
//! ON CONFLICT (GUILD_ID) DO UPDATE SET PREFIX = excluded.PREFIX
//!      │
//!      ├── no row yet → row created, other columns take their defaults
//!      └── row exists → only PREFIX changes
//! ```
//!
//! Rows are never deleted by the store.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use keyward_core::validation::{validate_duration_hours, validate_prefix};
use keyward_core::{
    ChannelId, GuildConfig, GuildId, RoleId, DEFAULT_LICENSE_DURATION_HOURS,
};

use crate::error::{DbError, DbResult};
use crate::repository::{parse_id, parse_optional_id};

/// Raw `GUILDS` row. Every column but the key is nullable on disk.
#[derive(Debug, FromRow)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
struct GuildRow {
    guild_id: String,
    prefix: Option<String>,
    enable_log_channel: Option<bool>,
    log_channel_id: Option<String>,
    enable_join_role: Option<bool>,
    join_role_id: Option<String>,
    default_license_role_id: Option<String>,
    default_license_duration_hours: Option<i64>,
}

impl TryFrom<GuildRow> for GuildConfig {
    type Error = DbError;

    fn try_from(row: GuildRow) -> DbResult<Self> {
        let key = row.guild_id.as_str();

        Ok(GuildConfig {
            guild_id: parse_id("Guild", key, key)?,
            prefix: row.prefix,
            enable_log_channel: row.enable_log_channel.unwrap_or(false),
            log_channel_id: parse_optional_id("Guild", key, row.log_channel_id.as_deref())?,
            enable_join_role: row.enable_join_role.unwrap_or(false),
            join_role_id: parse_optional_id("Guild", key, row.join_role_id.as_deref())?,
            default_license_role_id: parse_optional_id(
                "Guild",
                key,
                row.default_license_role_id.as_deref(),
            )?,
            default_license_duration_hours: duration_hours(key, row.default_license_duration_hours)?,
        })
    }
}

/// Stored duration, falling back to the default for NULL.
fn duration_hours(key: &str, raw: Option<i64>) -> DbResult<u64> {
    match raw {
        None => Ok(DEFAULT_LICENSE_DURATION_HOURS),
        Some(hours) => u64::try_from(hours).map_err(|_| {
            DbError::invalid("Guild", key, format!("negative license duration {hours}"))
        }),
    }
}

/// Repository for guild configuration.
#[derive(Debug, Clone)]
pub struct GuildRepository {
    pool: SqlitePool,
}

impl GuildRepository {
    /// Creates a new GuildRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GuildRepository { pool }
    }

    /// Gets a guild's configuration.
    ///
    /// ## Returns
    /// * `Ok(Some(GuildConfig))` - Guild has a row
    /// * `Ok(None)` - Guild was never configured
    pub async fn get(&self, guild_id: GuildId) -> DbResult<Option<GuildConfig>> {
        let row: Option<GuildRow> = sqlx::query_as(
            r#"
            SELECT
                GUILD_ID,
                PREFIX,
                ENABLE_LOG_CHANNEL,
                LOG_CHANNEL_ID,
                ENABLE_JOIN_ROLE,
                JOIN_ROLE_ID,
                DEFAULT_LICENSE_ROLE_ID,
                DEFAULT_LICENSE_DURATION_HOURS
            FROM GUILDS
            WHERE GUILD_ID = ?1
            "#,
        )
        .bind(guild_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(GuildConfig::try_from).transpose()
    }

    /// Creates the guild's row with defaults if it has none.
    ///
    /// Idempotent; an existing row is returned untouched.
    pub async fn provision(&self, guild_id: GuildId) -> DbResult<GuildConfig> {
        debug!(guild_id = %guild_id, "Provisioning guild");

        sqlx::query("INSERT INTO GUILDS (GUILD_ID) VALUES (?1) ON CONFLICT (GUILD_ID) DO NOTHING")
            .bind(guild_id.to_string())
            .execute(&self.pool)
            .await?;

        self.get(guild_id)
            .await?
            .ok_or_else(|| DbError::not_found("Guild", guild_id))
    }

    /// Sets or clears the command prefix.
    ///
    /// ## Returns
    /// * `Err(DbError::InvalidData)` - Prefix empty or longer than 3 characters
    pub async fn set_prefix(&self, guild_id: GuildId, prefix: Option<&str>) -> DbResult<()> {
        if let Some(prefix) = prefix {
            validate_prefix(prefix)?;
        }

        debug!(guild_id = %guild_id, prefix = ?prefix, "Setting prefix");

        sqlx::query(
            r#"
            INSERT INTO GUILDS (GUILD_ID, PREFIX) VALUES (?1, ?2)
            ON CONFLICT (GUILD_ID) DO UPDATE SET PREFIX = excluded.PREFIX
            "#,
        )
        .bind(guild_id.to_string())
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Enables logging to `channel`, or disables it with `None`.
    pub async fn set_log_channel(
        &self,
        guild_id: GuildId,
        channel: Option<ChannelId>,
    ) -> DbResult<()> {
        debug!(guild_id = %guild_id, channel = ?channel, "Setting log channel");

        sqlx::query(
            r#"
            INSERT INTO GUILDS (GUILD_ID, ENABLE_LOG_CHANNEL, LOG_CHANNEL_ID) VALUES (?1, ?2, ?3)
            ON CONFLICT (GUILD_ID) DO UPDATE SET
                ENABLE_LOG_CHANNEL = excluded.ENABLE_LOG_CHANNEL,
                LOG_CHANNEL_ID = excluded.LOG_CHANNEL_ID
            "#,
        )
        .bind(guild_id.to_string())
        .bind(channel.is_some())
        .bind(channel.map(|c| c.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Enables the join role `role`, or disables it with `None`.
    pub async fn set_join_role(&self, guild_id: GuildId, role: Option<RoleId>) -> DbResult<()> {
        debug!(guild_id = %guild_id, role = ?role, "Setting join role");

        sqlx::query(
            r#"
            INSERT INTO GUILDS (GUILD_ID, ENABLE_JOIN_ROLE, JOIN_ROLE_ID) VALUES (?1, ?2, ?3)
            ON CONFLICT (GUILD_ID) DO UPDATE SET
                ENABLE_JOIN_ROLE = excluded.ENABLE_JOIN_ROLE,
                JOIN_ROLE_ID = excluded.JOIN_ROLE_ID
            "#,
        )
        .bind(guild_id.to_string())
        .bind(role.is_some())
        .bind(role.map(|r| r.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets or clears the role bound to licenses generated without one.
    pub async fn set_default_license_role(
        &self,
        guild_id: GuildId,
        role: Option<RoleId>,
    ) -> DbResult<()> {
        debug!(guild_id = %guild_id, role = ?role, "Setting default license role");

        sqlx::query(
            r#"
            INSERT INTO GUILDS (GUILD_ID, DEFAULT_LICENSE_ROLE_ID) VALUES (?1, ?2)
            ON CONFLICT (GUILD_ID) DO UPDATE SET
                DEFAULT_LICENSE_ROLE_ID = excluded.DEFAULT_LICENSE_ROLE_ID
            "#,
        )
        .bind(guild_id.to_string())
        .bind(role.map(|r| r.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets how many hours a redeemed license lasts.
    pub async fn set_default_license_duration(&self, guild_id: GuildId, hours: u64) -> DbResult<()> {
        validate_duration_hours(hours)?;

        debug!(guild_id = %guild_id, hours, "Setting default license duration");

        // Bounded by validation, always fits
        let hours = i64::try_from(hours)
            .map_err(|_| DbError::invalid("Guild", guild_id, "license duration too large"))?;

        sqlx::query(
            r#"
            INSERT INTO GUILDS (GUILD_ID, DEFAULT_LICENSE_DURATION_HOURS) VALUES (?1, ?2)
            ON CONFLICT (GUILD_ID) DO UPDATE SET
                DEFAULT_LICENSE_DURATION_HOURS = excluded.DEFAULT_LICENSE_DURATION_HOURS
            "#,
        )
        .bind(guild_id.to_string())
        .bind(hours)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the role bound to licenses generated without an explicit role.
    ///
    /// ## Returns
    /// * `Ok(RoleId)` - Configured role
    /// * `Err(DbError::NotFound)` - Guild has no row (entity "Guild"), or
    ///   the role was never set (entity "Default license role")
    /// * `Err(DbError::InvalidData)` - Stored value is not a role id
    pub async fn get_default_license_role(&self, guild_id: GuildId) -> DbResult<RoleId> {
        let role: Option<Option<String>> =
            sqlx::query_scalar("SELECT DEFAULT_LICENSE_ROLE_ID FROM GUILDS WHERE GUILD_ID = ?1")
                .bind(guild_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match role {
            None => Err(DbError::not_found("Guild", guild_id)),
            Some(None) => Err(DbError::not_found("Default license role", guild_id)),
            Some(Some(raw)) => parse_id("Guild", guild_id, &raw),
        }
    }

    /// Hours a license redeemed in this guild lasts.
    ///
    /// Unconfigured guilds get [`DEFAULT_LICENSE_DURATION_HOURS`].
    pub async fn default_license_duration(&self, guild_id: GuildId) -> DbResult<u64> {
        let hours: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT DEFAULT_LICENSE_DURATION_HOURS FROM GUILDS WHERE GUILD_ID = ?1",
        )
        .bind(guild_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        duration_hours(&guild_id.to_string(), hours.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LicenseStore, StoreConfig};
    use tempfile::TempDir;

    async fn store() -> (TempDir, LicenseStore) {
        let dir = TempDir::new().unwrap();
        let store = LicenseStore::open(StoreConfig::new(dir.path()), "guilds")
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_unknown_guild() {
        let (_dir, store) = store().await;
        let repo = store.guilds();

        assert!(repo.get(GuildId::new(999)).await.unwrap().is_none());

        let err = repo.get_default_license_role(GuildId::new(999)).await.unwrap_err();
        match err {
            DbError::NotFound { entity, key } => {
                assert_eq!(entity, "Guild");
                assert_eq!(key, "999");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(repo.default_license_duration(GuildId::new(999)).await.unwrap(), 720);
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let (_dir, store) = store().await;
        let repo = store.guilds();
        let guild = GuildId::new(1);

        let config = repo.provision(guild).await.unwrap();
        assert_eq!(config, GuildConfig::new(guild));

        repo.set_prefix(guild, Some("?")).await.unwrap();
        let again = repo.provision(guild).await.unwrap();
        assert_eq!(again.prefix.as_deref(), Some("?"));
    }

    #[tokio::test]
    async fn test_null_default_role_is_not_found() {
        let (_dir, store) = store().await;
        let repo = store.guilds();
        let guild = GuildId::new(1);
        repo.provision(guild).await.unwrap();

        let err = repo.get_default_license_role(guild).await.unwrap_err();
        match err {
            DbError::NotFound { entity, .. } => assert_eq!(entity, "Default license role"),
            other => panic!("unexpected error: {other:?}"),
        }

        repo.set_default_license_role(guild, Some(RoleId::new(7)))
            .await
            .unwrap();
        assert_eq!(repo.get_default_license_role(guild).await.unwrap(), RoleId::new(7));

        repo.set_default_license_role(guild, None).await.unwrap();
        assert!(repo.get_default_license_role(guild).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_garbage_default_role_is_invalid_data() {
        let (_dir, store) = store().await;
        sqlx::query("INSERT INTO GUILDS (GUILD_ID, DEFAULT_LICENSE_ROLE_ID) VALUES ('1', 'oops')")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store
            .guilds()
            .get_default_license_role(GuildId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_setters_create_row_lazily() {
        let (_dir, store) = store().await;
        let repo = store.guilds();
        let guild = GuildId::new(5);

        repo.set_log_channel(guild, Some(ChannelId::new(11))).await.unwrap();
        repo.set_join_role(guild, Some(RoleId::new(12))).await.unwrap();
        repo.set_default_license_duration(guild, 48).await.unwrap();

        let config = repo.get(guild).await.unwrap().unwrap();
        assert_eq!(config.active_log_channel(), Some(ChannelId::new(11)));
        assert_eq!(config.active_join_role(), Some(RoleId::new(12)));
        assert_eq!(config.default_license_duration_hours, 48);
        assert_eq!(repo.default_license_duration(guild).await.unwrap(), 48);

        repo.set_log_channel(guild, None).await.unwrap();
        let config = repo.get(guild).await.unwrap().unwrap();
        assert!(!config.enable_log_channel);
        assert_eq!(config.log_channel_id, None);
        assert_eq!(config.active_join_role(), Some(RoleId::new(12)));
    }

    #[tokio::test]
    async fn test_prefix_rules() {
        let (_dir, store) = store().await;
        let repo = store.guilds();
        let guild = GuildId::new(1);

        assert!(matches!(
            repo.set_prefix(guild, Some("toolong")).await,
            Err(DbError::InvalidData { .. })
        ));
        assert!(repo.get(guild).await.unwrap().is_none());

        repo.set_prefix(guild, Some("k!")).await.unwrap();
        repo.set_prefix(guild, None).await.unwrap();
        assert_eq!(repo.get(guild).await.unwrap().unwrap().prefix, None);
    }

    #[tokio::test]
    async fn test_duration_rules() {
        let (_dir, store) = store().await;
        let repo = store.guilds();

        assert!(matches!(
            repo.set_default_license_duration(GuildId::new(1), 0).await,
            Err(DbError::InvalidData { .. })
        ));
    }
}
