//! # Licensed Member Repository
//!
//! Active role grants in `LICENSED_MEMBERS`.
//!
//! A member holds at most one grant per guild (`UNIQUE(MEMBER_ID, GUILD_ID)`),
//! so every write is an upsert: redeeming a second code replaces the first
//! grant instead of adding a row.
//!
//! Nothing expires rows automatically. [`MemberRepository::expired`] returns
//! the grants a reaper task should revoke.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use keyward_core::{GuildId, LicensedMember, MemberId};

use crate::error::{DbError, DbResult};
use crate::repository::parse_id;

/// Raw `LICENSED_MEMBERS` row.
#[derive(Debug, FromRow)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
struct MemberRow {
    member_id: Option<String>,
    guild_id: Option<String>,
    expiration_date: Option<DateTime<Utc>>,
    licensed_role_id: Option<String>,
}

impl TryFrom<MemberRow> for LicensedMember {
    type Error = DbError;

    fn try_from(row: MemberRow) -> DbResult<Self> {
        let member = row.member_id.unwrap_or_default();
        let key = format!("{}@{}", member, row.guild_id.as_deref().unwrap_or(""));
        let missing = |column: &str| DbError::invalid("Licensed member", &key, format!("{column} is NULL"));

        let guild = row.guild_id.as_deref().ok_or_else(|| missing("GUILD_ID"))?;
        let role = row
            .licensed_role_id
            .as_deref()
            .ok_or_else(|| missing("LICENSED_ROLE_ID"))?;

        Ok(LicensedMember {
            member_id: parse_id("Licensed member", &key, &member)?,
            guild_id: parse_id("Licensed member", &key, guild)?,
            expiration_date: row
                .expiration_date
                .ok_or_else(|| missing("EXPIRATION_DATE"))?,
            licensed_role_id: parse_id("Licensed member", &key, role)?,
        })
    }
}

const SELECT_MEMBER: &str =
    "SELECT MEMBER_ID, GUILD_ID, EXPIRATION_DATE, LICENSED_ROLE_ID FROM LICENSED_MEMBERS";

/// Inserts or overwrites the grant for (member, guild) on `conn`.
///
/// Shared with redemption, which runs it inside its own transaction.
pub(crate) async fn upsert_member(
    conn: &mut SqliteConnection,
    member: &LicensedMember,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO LICENSED_MEMBERS (MEMBER_ID, GUILD_ID, EXPIRATION_DATE, LICENSED_ROLE_ID)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (MEMBER_ID, GUILD_ID) DO UPDATE SET
            EXPIRATION_DATE = excluded.EXPIRATION_DATE,
            LICENSED_ROLE_ID = excluded.LICENSED_ROLE_ID
        "#,
    )
    .bind(member.member_id.to_string())
    .bind(member.guild_id.to_string())
    .bind(member.expiration_date)
    .bind(member.licensed_role_id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

/// Repository for licensed member operations.
#[derive(Debug, Clone)]
pub struct MemberRepository {
    pool: SqlitePool,
}

impl MemberRepository {
    /// Creates a new MemberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MemberRepository { pool }
    }

    /// Gets the grant a member holds in a guild.
    ///
    /// ## Returns
    /// * `Ok(Some(LicensedMember))` - Grant exists (possibly expired)
    /// * `Ok(None)` - Member holds no grant in this guild
    pub async fn get(
        &self,
        member_id: MemberId,
        guild_id: GuildId,
    ) -> DbResult<Option<LicensedMember>> {
        let row: Option<MemberRow> =
            sqlx::query_as(&format!("{SELECT_MEMBER} WHERE MEMBER_ID = ?1 AND GUILD_ID = ?2"))
                .bind(member_id.to_string())
                .bind(guild_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(LicensedMember::try_from).transpose()
    }

    /// Gets a member's grant only while it is still valid at `now`.
    ///
    /// Expired rows stay on disk until a reaper removes them; this is the
    /// check a caller makes before treating the member as entitled.
    pub async fn active(
        &self,
        member_id: MemberId,
        guild_id: GuildId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<LicensedMember>> {
        let grant = self.get(member_id, guild_id).await?;
        Ok(grant.filter(|grant| !grant.is_expired(now)))
    }

    /// Inserts a grant, replacing any existing one for the same member and guild.
    pub async fn upsert(&self, member: &LicensedMember) -> DbResult<()> {
        debug!(
            member_id = %member.member_id,
            guild_id = %member.guild_id,
            expires = %member.expiration_date,
            "Upserting licensed member"
        );

        let mut conn = self.pool.acquire().await?;
        upsert_member(&mut conn, member).await
    }

    /// Removes a member's grant.
    ///
    /// ## Returns
    /// `true` if a grant was removed, `false` if there was none.
    pub async fn remove(&self, member_id: MemberId, guild_id: GuildId) -> DbResult<bool> {
        debug!(member_id = %member_id, guild_id = %guild_id, "Removing licensed member");

        let result = sqlx::query("DELETE FROM LICENSED_MEMBERS WHERE MEMBER_ID = ?1 AND GUILD_ID = ?2")
            .bind(member_id.to_string())
            .bind(guild_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Grants that have run out at `now`, oldest first.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// for grant in store.members().expired(Utc::now(), 100).await? {
    ///     revoke_role(&grant).await?;
    ///     store.members().remove(grant.member_id, grant.guild_id).await?;
    /// }
    /// ```
    pub async fn expired(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<LicensedMember>> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "{SELECT_MEMBER} \
             WHERE julianday(EXPIRATION_DATE) <= julianday(?1) \
             ORDER BY julianday(EXPIRATION_DATE) \
             LIMIT ?2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Found expired licensed members");
        rows.into_iter().map(LicensedMember::try_from).collect()
    }

    /// All grants in a guild, soonest expiry first.
    pub async fn list_for_guild(&self, guild_id: GuildId) -> DbResult<Vec<LicensedMember>> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "{SELECT_MEMBER} WHERE GUILD_ID = ?1 ORDER BY julianday(EXPIRATION_DATE)"
        ))
        .bind(guild_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LicensedMember::try_from).collect()
    }
}
