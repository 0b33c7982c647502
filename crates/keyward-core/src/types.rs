//! # Domain Types
//!
//! Core domain types used by the license store and its callers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  GuildConfig    │   │  GuildLicense   │   │ LicensedMember  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  guild_id (PK)  │   │  license (PK)   │   │  member_id ┐    │       │
//! │  │  prefix         │   │  guild_id       │   │  guild_id  ┘UQ  │       │
//! │  │  log channel    │   │  licensed_role  │   │  expiration     │       │
//! │  │  join role      │   └─────────────────┘   │  licensed_role  │       │
//! │  │  default role   │                         └─────────────────┘       │
//! │  │  default hours  │                                                   │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  Ids: GuildId, RoleId, MemberId, ChannelId (Discord snowflakes)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snowflakes
//! Ids are `u64` in memory and `TEXT` on disk. Keeping a distinct type per
//! kind stops a role id from being passed where a guild id is expected.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::DEFAULT_LICENSE_DURATION_HOURS;

// =============================================================================
// Snowflake Ids
// =============================================================================

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw snowflake.
            #[inline]
            pub const fn new(id: u64) -> Self {
                $name(id)
            }

            /// Returns the raw snowflake.
            #[inline]
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                $name(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(ValidationError::Required {
                        field: $field.to_string(),
                    });
                }
                s.parse::<u64>()
                    .map($name)
                    .map_err(|e| ValidationError::InvalidFormat {
                        field: $field.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

snowflake_id!(
    /// A guild (community server) id.
    GuildId,
    "guild_id"
);
snowflake_id!(
    /// A role id, granted to members on redemption.
    RoleId,
    "role_id"
);
snowflake_id!(
    /// A guild member (user) id.
    MemberId,
    "member_id"
);
snowflake_id!(
    /// A text channel id.
    ChannelId,
    "channel_id"
);

// =============================================================================
// Guild Configuration
// =============================================================================

/// Per-guild settings, one row in `GUILDS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: GuildId,

    /// Command prefix, at most three characters.
    pub prefix: Option<String>,

    pub enable_log_channel: bool,
    pub log_channel_id: Option<ChannelId>,

    pub enable_join_role: bool,
    pub join_role_id: Option<RoleId>,

    /// Role bound to generated licenses when the command omits one.
    /// `None` until an admin configures it.
    pub default_license_role_id: Option<RoleId>,

    /// Hours a redeemed license stays valid.
    pub default_license_duration_hours: u64,
}

impl GuildConfig {
    /// Configuration a guild gets before anyone changes it.
    pub fn new(guild_id: GuildId) -> Self {
        GuildConfig {
            guild_id,
            prefix: None,
            enable_log_channel: false,
            log_channel_id: None,
            enable_join_role: false,
            join_role_id: None,
            default_license_role_id: None,
            default_license_duration_hours: DEFAULT_LICENSE_DURATION_HOURS,
        }
    }

    /// Log channel, only if the toggle is on.
    pub fn active_log_channel(&self) -> Option<ChannelId> {
        self.log_channel_id.filter(|_| self.enable_log_channel)
    }

    /// Join role, only if the toggle is on.
    pub fn active_join_role(&self) -> Option<RoleId> {
        self.join_role_id.filter(|_| self.enable_join_role)
    }
}

// =============================================================================
// Licenses
// =============================================================================

/// An issued, not yet redeemed license code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildLicense {
    /// The code itself. Globally unique.
    pub license: String,
    pub guild_id: GuildId,
    pub licensed_role_id: RoleId,
}

/// A role entitlement held by a member until `expiration_date`.
///
/// At most one per (member, guild).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensedMember {
    pub member_id: MemberId,
    pub guild_id: GuildId,
    pub expiration_date: DateTime<Utc>,
    pub licensed_role_id: RoleId,
}

impl LicensedMember {
    /// Builds the membership granted by redeeming a license at `redeemed_at`.
    pub fn granted(
        member_id: MemberId,
        license: &GuildLicense,
        redeemed_at: DateTime<Utc>,
        duration_hours: u64,
    ) -> Self {
        LicensedMember {
            member_id,
            guild_id: license.guild_id,
            expiration_date: redeemed_at
                .checked_add_signed(license_duration(duration_hours))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            licensed_role_id: license.licensed_role_id,
        }
    }

    /// Whether the grant has run out at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}

/// Converts stored hours into a duration, saturating instead of overflowing.
fn license_duration(hours: u64) -> Duration {
    let hours = i64::try_from(hours).unwrap_or(i64::MAX);
    Duration::try_hours(hours).unwrap_or(Duration::MAX)
}
