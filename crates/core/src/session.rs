//! session key validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted session key length in bytes.
const MAX_KEY_LEN: usize = 64;

/// Rejection reasons for a malformed session key.
///
/// These are validation errors: reported to the offending caller only,
/// never broadcast, never a state change.
#[derive(Debug, Error, PartialEq, Eq,)]
pub enum SessionKeyError {
    /// The key was empty or whitespace.
    #[error("session key is empty")]
    Empty,
    /// The key exceeded [`MAX_KEY_LEN`] bytes.
    #[error("session key is longer than {MAX_KEY_LEN} characters")]
    TooLong,
    /// The key contained characters outside `[A-Za-z0-9_-]`.
    #[error("session key contains invalid characters")]
    InvalidChars,
}

/// A validated lobby or contest session key.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SessionKey(String,);

impl SessionKey {
    /// Validates and wraps a raw session key taken off the wire.
    pub fn parse(raw: &str,) -> Result<Self, SessionKeyError,> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SessionKeyError::Empty,);
        }
        if trimmed.len() > MAX_KEY_LEN {
            return Err(SessionKeyError::TooLong,);
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-',)
        {
            return Err(SessionKeyError::InvalidChars,);
        }
        Ok(Self(trimmed.to_string(),),)
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self,) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_keys() {
        assert!(SessionKey::parse("lobby-42").is_ok());
        assert!(SessionKey::parse("A_b-9").is_ok());
        // surrounding whitespace is tolerated and stripped.
        assert_eq!(
            SessionKey::parse(" lobby-42 ").unwrap().as_str(),
            "lobby-42"
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(SessionKey::parse(""), Err(SessionKeyError::Empty));
        assert_eq!(SessionKey::parse("   "), Err(SessionKeyError::Empty));
        assert_eq!(
            SessionKey::parse("has space"),
            Err(SessionKeyError::InvalidChars)
        );
        assert_eq!(
            SessionKey::parse(&"x".repeat(65)),
            Err(SessionKeyError::TooLong)
        );
    }
}
