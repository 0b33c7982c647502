//! # keyward-db: License Store for Keyward
//!
//! SQLite persistence for guild configuration, issued license codes and
//! licensed members, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keyward Data Flow                                │
//! │                                                                         │
//! │  Bot command (!redeem ABCDE-...)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   keyward-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ LicenseStore  │    │  Repositories │    │    Schema    │  │   │
//! │  │   │  (store.rs)   │    │               │    │ (schema.rs)  │  │   │
//! │  │   │               │    │ GuildRepo     │    │              │  │   │
//! │  │   │ SqlitePool(1) │◄───│ LicenseRepo   │    │ GUILDS       │  │   │
//! │  │   │ open / close  │    │ MemberRepo    │    │ LICENSED_... │  │   │
//! │  │   │ backup        │    │               │    │ GUILD_LIC... │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │              databases/<name>.sqlite3                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - File layout and connection settings
//! - [`store`] - Opening, closing and backing up a database
//! - [`schema`] - Table definitions and first-run bootstrap
//! - [`error`] - Database error types
//! - [`repository`] - Guild, license and member repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keyward_db::{LicenseStore, StoreConfig};
//!
//! let store = LicenseStore::open(StoreConfig::from_env()?, "main").await?;
//!
//! let codes = store.licenses().generate_licenses(5, guild, role).await?;
//! let grant = store.licenses().redeem_for_member(&codes[0], guild, member).await?;
//!
//! store.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod repository;
pub mod schema;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, StoreConfig};
pub use error::{DbError, DbResult};
pub use store::LicenseStore;

// Repository re-exports for convenience
pub use repository::guild::GuildRepository;
pub use repository::license::LicenseRepository;
pub use repository::member::MemberRepository;
