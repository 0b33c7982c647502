//! # Validation Module
//!
//! Input checks applied before anything reaches the store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Bot command parsing                                          │
//! │  └── Argument types (snowflakes parse via FromStr)                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Prefix length, non-empty batch, duration bounds                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK(LENGTH(PREFIX) <= 3)                                        │
//! │  └── PRIMARY KEY / UNIQUE constraints                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use keyward_core::validation::{validate_license_count, validate_prefix};
//!
//! assert!(validate_prefix("!k").is_ok());
//! assert!(validate_license_count(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::{MAX_LICENSE_DURATION_HOURS, MAX_PREFIX_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a command prefix.
///
/// ## Rules
/// - Must not be empty (clear the prefix with `None` instead)
/// - At most [`MAX_PREFIX_LEN`] characters, counted as characters not bytes,
///   matching SQLite's `LENGTH()`
///
/// ## Example
/// ```rust
/// use keyward_core::validation::validate_prefix;
///
/// assert!(validate_prefix("?").is_ok());
/// assert!(validate_prefix("ñ!#").is_ok());
/// assert!(validate_prefix("!!!!").is_err());
/// ```
pub fn validate_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "prefix".to_string(),
        });
    }

    if prefix.chars().count() > MAX_PREFIX_LEN {
        return Err(ValidationError::TooLong {
            field: "prefix".to_string(),
            max: MAX_PREFIX_LEN,
        });
    }

    Ok(())
}

/// Validates the number of licenses requested in one batch.
///
/// Any positive count is accepted; the batch is bounded only by what the
/// generator and the database can hold.
pub fn validate_license_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::MustBePositive {
            field: "license count".to_string(),
        });
    }

    Ok(())
}

/// Validates a license duration in hours.
pub fn validate_duration_hours(hours: u64) -> ValidationResult<()> {
    if hours == 0 {
        return Err(ValidationError::MustBePositive {
            field: "license duration".to_string(),
        });
    }

    if hours > MAX_LICENSE_DURATION_HOURS {
        return Err(ValidationError::OutOfRange {
            field: "license duration".to_string(),
            min: 1,
            max: MAX_LICENSE_DURATION_HOURS,
        });
    }

    Ok(())
}

/// Validates a license code as typed by a member.
///
/// Returns the trimmed code.
pub fn validate_license_code(code: &str) -> ValidationResult<&str> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "license".to_string(),
        });
    }

    Ok(code)
}
