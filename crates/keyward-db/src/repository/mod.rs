//! # Repository Module
//!
//! One repository per licensing table.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Bot command                                                           │
//! │       │                                                                 │
//! │       │  store.licenses().redeem_for_member(code, guild, member)       │
//! │       ▼                                                                 │
//! │  LicenseRepository ──┐                                                 │
//! │  GuildRepository ────┼──► SqlitePool (one connection) ──► SQLite file  │
//! │  MemberRepository ───┘                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`GuildRepository`](guild::GuildRepository) - `GUILDS` configuration
//! - [`LicenseRepository`](license::LicenseRepository) - `GUILD_LICENSES`
//!   generation, lookup and redemption
//! - [`MemberRepository`](member::MemberRepository) - `LICENSED_MEMBERS`
//!
//! Ids are stored as TEXT. Reading them back goes through [`parse_id`] so a
//! malformed value becomes `InvalidData` naming the row instead of a panic or
//! a silent zero.

pub mod guild;
pub mod license;
pub mod member;

use std::fmt::Display;
use std::str::FromStr;

use keyward_core::ValidationError;

use crate::error::{DbError, DbResult};

/// Parses a stored snowflake, reporting which row held a bad value.
pub(crate) fn parse_id<T>(entity: &str, key: impl Display, raw: &str) -> DbResult<T>
where
    T: FromStr<Err = ValidationError>,
{
    raw.parse::<T>()
        .map_err(|e| DbError::invalid(entity, key, e.to_string()))
}

/// Parses a nullable stored snowflake.
pub(crate) fn parse_optional_id<T>(
    entity: &str,
    key: impl Display,
    raw: Option<&str>,
) -> DbResult<Option<T>>
where
    T: FromStr<Err = ValidationError>,
{
    raw.map(|raw| parse_id(entity, key, raw)).transpose()
}
