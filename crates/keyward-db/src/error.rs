//! # Store Error Types
//!
//! Error types for license store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        ValidationError (keyward-core)      │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  DbError (this module) ← Adds entity/key context and categorization    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Bot command layer ← Chooses the user-facing reply                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Categories
//! | Variant              | Recoverable? | Typical cause                        |
//! |----------------------|--------------|--------------------------------------|
//! | `StorageUnavailable` | no           | I/O, corrupt file, closed store      |
//! | `DuplicateLicense`   | yes          | Generator produced a taken code      |
//! | `NotFound`           | yes          | Used/unknown code, unconfigured guild|
//! | `InvalidData`        | yes          | Constraint violation, bad stored id  |

use keyward_core::ValidationError;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// License store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database could not be reached or used.
    ///
    /// ## When This Occurs
    /// - Storage directory is not writable
    /// - File is not a SQLite database, or its tables are missing
    /// - Busy/acquire timeout expired
    /// - The store was closed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A license code in a generated batch already exists.
    ///
    /// The whole batch was rolled back.
    #[error("Duplicate license: '{license}' already exists")]
    DuplicateLicense { license: String },

    /// Lookup miss.
    ///
    /// ## When This Occurs
    /// - License code already redeemed or never issued
    /// - Guild has no configuration row
    /// - Guild has no default license role configured
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// Stored or supplied data breaks a rule.
    ///
    /// ## When This Occurs
    /// - CHECK / UNIQUE / NOT NULL constraint violation
    /// - A stored id that does not parse as a snowflake
    /// - Input rejected by keyward-core validation
    #[error("Invalid {entity} '{key}': {reason}")]
    InvalidData {
        entity: String,
        key: String,
        reason: String,
    },
}

impl DbError {
    /// Creates a NotFound error for a given entity type and key.
    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    /// Creates an InvalidData error.
    pub fn invalid(
        entity: impl Into<String>,
        key: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        DbError::InvalidData {
            entity: entity.into(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a DuplicateLicense error.
    pub fn duplicate_license(license: impl Into<String>) -> Self {
        DbError::DuplicateLicense {
            license: license.into(),
        }
    }

    /// Whether this is an expected lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Whether the store itself is unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DbError::StorageUnavailable(_))
    }
}

/// Whether an engine error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound          → DbError::NotFound
/// sqlx::Error::Database (constraint)→ DbError::InvalidData
/// sqlx::Error::Database (other)     → DbError::StorageUnavailable
/// sqlx::Error::ColumnDecode/Decode  → DbError::InvalidData
/// Other (I/O, pool, protocol)       → DbError::StorageUnavailable
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let table = db_err.table().unwrap_or("unknown").to_string();

                match db_err.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::CheckViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::ForeignKeyViolation => DbError::invalid(table, "constraint", msg),
                    // Locked/busy, "file is not a database", missing tables
                    _ => DbError::StorageUnavailable(msg),
                }
            }

            sqlx::Error::ColumnDecode { index, source } => {
                DbError::invalid("Column", index, source.to_string())
            }

            sqlx::Error::Decode(source) => DbError::invalid("Value", "decode", source.to_string()),

            sqlx::Error::PoolTimedOut => {
                DbError::StorageUnavailable("Timed out waiting for the connection".to_string())
            }

            sqlx::Error::PoolClosed => DbError::StorageUnavailable("Store is closed".to_string()),

            _ => DbError::StorageUnavailable(err.to_string()),
        }
    }
}

/// Validation failures surface as InvalidData naming the field.
impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::InvalidData {
            entity: "Input".to_string(),
            key: err.field().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
