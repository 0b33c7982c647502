//! # License Repository
//!
//! Generation, lookup and redemption of codes in `GUILD_LICENSES`.
//!
//! ## License Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       License Lifecycle                                 │
//! │                                                                         │
//! │  1. GENERATE                                                           │
//! │     └── generate_licenses(n, guild, role)                              │
//! │         BEGIN → n × INSERT → COMMIT   (any duplicate → no rows)        │
//! │                                                                         │
//! │  2. LOOK UP                                                            │
//! │     ├── get_license_role(code) → role                                  │
//! │     └── list_licenses(limit, guild, role) → codes                      │
//! │                                                                         │
//! │  3. REDEEM (exactly once)                                              │
//! │     └── redeem_for_member(code, guild, member)                         │
//! │         ┌──────────────── SINGLE TRANSACTION ────────────────┐         │
//! │         │ SELECT role FROM GUILD_LICENSES                    │         │
//! │         │ SELECT duration FROM GUILDS                        │         │
//! │         │ DELETE FROM GUILD_LICENSES                         │         │
//! │         │ UPSERT LICENSED_MEMBERS                            │         │
//! │         └────────────────────────────────────────────────────┘         │
//! │         Code consumed ⇔ member entitled                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method taking a code trims surrounding whitespace first, so a code
//! pasted with stray spaces resolves the same way everywhere. A blank code is
//! `InvalidData`.
//!
//! [`LicenseRepository::redeem_license`] only deletes the code. Callers that
//! also grant the role must use [`LicenseRepository::redeem_for_member`], or
//! a code can be consumed without anyone receiving the entitlement.

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use keyward_core::validation::{validate_license_code, validate_license_count};
use keyward_core::{GuildId, GuildLicense, LicenseGenerator, LicensedMember, MemberId, RoleId};

use crate::error::{is_unique_violation, DbError, DbResult};
use crate::repository::member::upsert_member;
use crate::repository::parse_id;

/// Raw `GUILD_LICENSES` row.
#[derive(Debug, FromRow)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
struct LicenseRow {
    license: String,
    guild_id: Option<String>,
    licensed_role_id: Option<String>,
}

impl TryFrom<LicenseRow> for GuildLicense {
    type Error = DbError;

    fn try_from(row: LicenseRow) -> DbResult<Self> {
        let key = row.license.as_str();
        let guild = row
            .guild_id
            .as_deref()
            .ok_or_else(|| DbError::invalid("License", key, "GUILD_ID is NULL"))?;

        Ok(GuildLicense {
            guild_id: parse_id("License", key, guild)?,
            licensed_role_id: role_of(key, row.licensed_role_id.as_deref())?,
            license: row.license.clone(),
        })
    }
}

/// A license's role column, which must be present.
fn role_of(license: &str, raw: Option<&str>) -> DbResult<RoleId> {
    let raw = raw.ok_or_else(|| DbError::invalid("License", license, "LICENSED_ROLE_ID is NULL"))?;
    parse_id("License", license, raw)
}

/// Repository for license code operations.
#[derive(Clone)]
pub struct LicenseRepository {
    pool: SqlitePool,
    generator: Arc<dyn LicenseGenerator>,
}

impl std::fmt::Debug for LicenseRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseRepository").finish_non_exhaustive()
    }
}

impl LicenseRepository {
    /// Creates a new LicenseRepository.
    pub fn new(pool: SqlitePool, generator: Arc<dyn LicenseGenerator>) -> Self {
        LicenseRepository { pool, generator }
    }

    /// Issues `count` new codes bound to `role_id` in `guild_id`.
    ///
    /// ## What This Does
    /// 1. Asks the generator for `count` codes
    /// 2. Inserts them all in one transaction
    /// 3. Commits only if every insert succeeded
    ///
    /// ## Returns
    /// * `Ok(Vec<String>)` - The codes, in generation order
    /// * `Err(DbError::DuplicateLicense)` - A code already exists (or repeats
    ///   within the batch); nothing was persisted
    /// * `Err(DbError::InvalidData)` - `count` is zero, or the generator
    ///   returned the wrong number of codes
    pub async fn generate_licenses(
        &self,
        count: usize,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> DbResult<Vec<String>> {
        validate_license_count(count)?;

        let codes = self.generator.generate(count);
        if codes.len() != count {
            return Err(DbError::invalid(
                "License batch",
                guild_id,
                format!("generator returned {} codes, expected {}", codes.len(), count),
            ));
        }

        debug!(guild_id = %guild_id, role_id = %role_id, count, "Generating licenses");

        let guild = guild_id.to_string();
        let role = role_id.to_string();

        // Dropping `tx` without commit rolls the whole batch back
        let mut tx = self.pool.begin().await?;

        for code in &codes {
            let inserted = sqlx::query(
                "INSERT INTO GUILD_LICENSES (LICENSE, GUILD_ID, LICENSED_ROLE_ID) VALUES (?1, ?2, ?3)",
            )
            .bind(code)
            .bind(&guild)
            .bind(&role)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    warn!(guild_id = %guild_id, license = %code, "Duplicate license, batch rolled back");
                    return Err(DbError::duplicate_license(code.as_str()));
                }
                Err(err) => return Err(err.into()),
            }
        }

        tx.commit().await?;

        info!(guild_id = %guild_id, role_id = %role_id, count, "Licenses generated");
        Ok(codes)
    }

    /// Deletes a code, typically once it has been redeemed.
    ///
    /// Redeeming a code that does not exist (already used, never issued, or
    /// issued by another guild) is not an error.
    ///
    /// ## Returns
    /// `true` if this call removed the code, `false` if it was already gone.
    pub async fn redeem_license(&self, license: &str, guild_id: GuildId) -> DbResult<bool> {
        let license = validate_license_code(license)?;

        let result = sqlx::query("DELETE FROM GUILD_LICENSES WHERE LICENSE = ?1 AND GUILD_ID = ?2")
            .bind(license)
            .bind(guild_id.to_string())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(guild_id = %guild_id, license = %license, removed, "Redeemed license");
        Ok(removed)
    }

    /// Consumes a code and records the member's entitlement atomically.
    ///
    /// ## What This Does
    /// In one transaction:
    /// 1. Reads the role bound to `license` in `guild_id`
    /// 2. Reads the guild's license duration (default 720 hours)
    /// 3. Deletes the code
    /// 4. Inserts or overwrites the member's grant, expiring
    ///    `now + duration`
    ///
    /// The caller grants the Discord role after this returns `Ok`.
    ///
    /// ## Returns
    /// * `Ok(LicensedMember)` - The grant that was written
    /// * `Err(DbError::NotFound)` - Code unknown or already used; nothing
    ///   was written
    pub async fn redeem_for_member(
        &self,
        license: &str,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> DbResult<LicensedMember> {
        let license = validate_license_code(license)?;
        let guild = guild_id.to_string();

        // Dropping `tx` without commit rolls back every step below
        let mut tx = self.pool.begin().await?;

        let role: Option<Option<String>> = sqlx::query_scalar(
            "SELECT LICENSED_ROLE_ID FROM GUILD_LICENSES WHERE LICENSE = ?1 AND GUILD_ID = ?2",
        )
        .bind(license)
        .bind(&guild)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(role) = role else {
            debug!(guild_id = %guild_id, license = %license, "License not found for redemption");
            return Err(DbError::not_found("License", license));
        };
        let role_id = role_of(license, role.as_deref())?;

        let hours: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT DEFAULT_LICENSE_DURATION_HOURS FROM GUILDS WHERE GUILD_ID = ?1",
        )
        .bind(&guild)
        .fetch_optional(&mut *tx)
        .await?;
        let hours = match hours.flatten() {
            None => keyward_core::DEFAULT_LICENSE_DURATION_HOURS,
            Some(h) => u64::try_from(h)
                .map_err(|_| DbError::invalid("Guild", guild_id, format!("negative license duration {h}")))?,
        };

        let deleted = sqlx::query("DELETE FROM GUILD_LICENSES WHERE LICENSE = ?1 AND GUILD_ID = ?2")
            .bind(license)
            .bind(&guild)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() != 1 {
            return Err(DbError::not_found("License", license));
        }

        let redeemed = GuildLicense {
            license: license.to_string(),
            guild_id,
            licensed_role_id: role_id,
        };
        let member = LicensedMember::granted(member_id, &redeemed, Utc::now(), hours);
        upsert_member(&mut *tx, &member).await?;

        tx.commit().await?;

        info!(
            guild_id = %guild_id,
            member_id = %member_id,
            role_id = %role_id,
            expires = %member.expiration_date,
            "License redeemed"
        );
        Ok(member)
    }

    /// Gets the role an unredeemed code grants.
    ///
    /// ## Returns
    /// * `Ok(RoleId)` - The bound role
    /// * `Err(DbError::NotFound)` - Code used or never issued; callers should
    ///   reply "invalid or used code"
    pub async fn get_license_role(&self, license: &str) -> DbResult<RoleId> {
        let license = validate_license_code(license)?;

        let role: Option<Option<String>> =
            sqlx::query_scalar("SELECT LICENSED_ROLE_ID FROM GUILD_LICENSES WHERE LICENSE = ?1")
                .bind(license)
                .fetch_optional(&self.pool)
                .await?;

        match role {
            None => Err(DbError::not_found("License", license)),
            Some(raw) => role_of(license, raw.as_deref()),
        }
    }

    /// Gets a full license row.
    pub async fn get(&self, license: &str) -> DbResult<Option<GuildLicense>> {
        let license = validate_license_code(license)?;

        let row: Option<LicenseRow> = sqlx::query_as(
            "SELECT LICENSE, GUILD_ID, LICENSED_ROLE_ID FROM GUILD_LICENSES WHERE LICENSE = ?1",
        )
        .bind(license)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GuildLicense::try_from).transpose()
    }

    /// Up to `limit` unredeemed codes for a guild and role.
    ///
    /// Rows come back in insertion order. Empty when nothing matches.
    pub async fn list_licenses(
        &self,
        limit: u32,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> DbResult<Vec<String>> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT LICENSE
            FROM GUILD_LICENSES
            WHERE GUILD_ID = ?1 AND LICENSED_ROLE_ID = ?2
            ORDER BY rowid
            LIMIT ?3
            "#,
        )
        .bind(guild_id.to_string())
        .bind(role_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        debug!(guild_id = %guild_id, role_id = %role_id, count = codes.len(), "Listed licenses");
        Ok(codes)
    }

    /// Counts unredeemed codes in a guild (for diagnostics).
    pub async fn count_licenses(&self, guild_id: GuildId) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM GUILD_LICENSES WHERE GUILD_ID = ?1")
            .bind(guild_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
