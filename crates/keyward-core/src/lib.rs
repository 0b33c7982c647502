//! # keyward-core: Domain Types for Keyward
//!
//! Pure types and rules for the guild licensing system, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keyward Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Bot command layer (external)                    │   │
//! │  │     !generate, !redeem, !licenses, !config ...                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ keyward-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐                │   │
//! │  │   │   types   │  │ generator  │  │ validation │                │   │
//! │  │   │ GuildId   │  │ License-   │  │  prefix    │                │   │
//! │  │   │ Licensed- │  │ Generator  │  │  count     │                │   │
//! │  │   │ Member    │  │            │  │  duration  │                │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                keyward-db (License Store)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Snowflake ids and the three stored records
//! - [`generator`] - License code generation seam
//! - [`validation`] - Input rules
//! - [`error`] - Validation errors

pub mod error;
pub mod generator;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use generator::{LicenseGenerator, RandomLicenseGenerator};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Hours a redeemed license lasts when the guild never configured it (30 days).
pub const DEFAULT_LICENSE_DURATION_HOURS: u64 = 720;

/// Upper bound accepted for a configured duration (100 years).
pub const MAX_LICENSE_DURATION_HOURS: u64 = 24 * 365 * 100;

/// Longest command prefix a guild may configure.
pub const MAX_PREFIX_LEN: usize = 3;
