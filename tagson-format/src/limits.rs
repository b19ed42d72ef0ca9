//! Walk limits and configuration

use crate::error::{Result, TagsonError};
use serde::Deserialize;

/// Limits guarding a single encapsulate/revive walk
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum container nesting depth (default: 512, hard: 10,000)
    pub max_depth: usize,
    /// Maximum chained type replacements at one keypath (default: 16, hard: 256)
    pub max_type_chain: usize,
    /// Maximum length of an array built from numeric object keys
    /// (default: 16,777,216, hard: 1,073,741,824)
    pub max_array_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 512,
            max_type_chain: 16,
            max_array_len: 1 << 24,
        }
    }
}

impl Limits {
    /// Hard maximum limits that cannot be exceeded
    pub fn hard_maximums() -> Self {
        Self {
            max_depth: 10_000,
            max_type_chain: 256,
            max_array_len: 1 << 30,
        }
    }

    /// Validate limits against hard maximums
    pub fn validate(&self) -> Result<()> {
        let hard = Self::hard_maximums();
        if self.max_depth == 0 || self.max_depth > hard.max_depth {
            return Err(TagsonError::InvalidOptions(format!(
                "max_depth {} must be between 1 and {}",
                self.max_depth, hard.max_depth
            )));
        }
        if self.max_type_chain == 0 || self.max_type_chain > hard.max_type_chain {
            return Err(TagsonError::InvalidOptions(format!(
                "max_type_chain {} must be between 1 and {}",
                self.max_type_chain, hard.max_type_chain
            )));
        }
        if self.max_array_len > hard.max_array_len {
            return Err(TagsonError::InvalidOptions(format!(
                "max_array_len {} exceeds hard limit {}",
                self.max_array_len, hard.max_array_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_within_hard_max() {
        assert!(Limits::default().validate().is_ok());
        assert!(Limits::hard_maximums().validate().is_ok());
    }

    #[test]
    fn rejects_excessive_depth() {
        let limits = Limits {
            max_depth: 20_000,
            ..Limits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn rejects_zero_chain() {
        let limits = Limits {
            max_type_chain: 0,
            ..Limits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn deserializes_partial_config() {
        let limits: Limits = serde_json::from_str(r#"{"max_depth": 64}"#).unwrap();
        assert_eq!(limits.max_depth, 64);
        assert_eq!(limits.max_type_chain, 16);
        assert_eq!(limits.max_array_len, 1 << 24);
    }

    #[test]
    fn rejects_excessive_array_len() {
        let limits = Limits {
            max_array_len: usize::MAX,
            ..Limits::default()
        };
        assert!(limits.validate().is_err());
    }
}
