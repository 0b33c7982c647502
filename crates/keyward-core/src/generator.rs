//! # License Code Generation
//!
//! The store never invents codes itself. It asks a [`LicenseGenerator`] for a
//! batch and trusts the result to be unique, falling back only on the
//! `GUILD_LICENSES` primary key.
//!
//! ## Default Format
//! ```text
//! UUID v4 (122 random bits)
//!      │
//!      ▼
//! 32 uppercase hex chars, first 20 kept
//!      │
//!      ▼
//! 3F9A1-07BC2-E45D0-9A8F1
//! ```

use uuid::Uuid;

/// Source of license codes.
///
/// Implementations must return exactly `count` codes, unique within the
/// batch and with overwhelming probability across batches.
pub trait LicenseGenerator: Send + Sync {
    /// Produces `count` fresh codes.
    fn generate(&self, count: usize) -> Vec<String>;
}

/// Random codes grouped as `XXXXX-XXXXX-XXXXX-XXXXX`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLicenseGenerator;

/// Characters per dash-separated group.
const GROUP_LEN: usize = 5;
const GROUPS: usize = 4;

impl RandomLicenseGenerator {
    fn code() -> String {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        hex.as_bytes()
            .chunks(GROUP_LEN)
            .take(GROUPS)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl LicenseGenerator for RandomLicenseGenerator {
    fn generate(&self, count: usize) -> Vec<String> {
        (0..count).map(|_| Self::code()).collect()
    }
}

impl<F> LicenseGenerator for F
where
    F: Fn(usize) -> Vec<String> + Send + Sync,
{
    fn generate(&self, count: usize) -> Vec<String> {
        self(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_code_format() {
        let codes = RandomLicenseGenerator.generate(1);
        let code = &codes[0];

        assert_eq!(code.len(), GROUPS * GROUP_LEN + GROUPS - 1);
        let groups: Vec<&str> = code.split('-').collect();
        assert_eq!(groups.len(), GROUPS);
        assert!(groups.iter().all(|g| g.len() == GROUP_LEN));
        assert!(code
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_random_codes_are_distinct() {
        let codes = RandomLicenseGenerator.generate(500);
        assert_eq!(codes.len(), 500);

        let unique: HashSet<&String> = codes.iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[test]
    fn test_closure_generator() {
        let fixed = |count: usize| (0..count).map(|i| format!("CODE-{i}")).collect::<Vec<_>>();
        assert_eq!(fixed.generate(2), vec!["CODE-0", "CODE-1"]);
    }
}
