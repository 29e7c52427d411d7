use core::fmt;

use thiserror::Error;

/// Errors returned by [`KeyStore`](crate::KeyStore) operations.
///
/// The display strings double as the messages the transport layer sends back
/// to callers, so keep them stable.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// No record exists for the id.
    #[error("Key not found")]
    NotFound,

    /// The record exists but is blocked or its lease has lapsed.
    #[error("Key is blocked or expired")]
    Forbidden(Invalidity),

    /// Malformed input to a mutating operation.
    #[error("Invalid request. {0}")]
    InvalidArgument(&'static str),
}

/// Why a record currently fails the validity check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalidity {
    Blocked,
    Expired,
}

impl fmt::Display for Invalidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => f.pad("blocked"),
            Self::Expired => f.pad("expired"),
        }
    }
}

/// Rejected lease configuration.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("lease duration must be greater than zero")]
    ZeroLease,

    #[error("lease duration of {0}s is out of range")]
    LeaseOutOfRange(u64),

    #[error("reap interval must be greater than zero")]
    ZeroReapInterval,
}

/// A string that does not parse as a [`KeyId`](crate::KeyId).
#[derive(Debug, Error)]
#[error("invalid key id: {0}")]
pub struct InvalidKeyId(#[from] uuid::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_match_wire_contract() {
        assert_eq!(KeyError::NotFound.to_string(), "Key not found");
        assert_eq!(
            KeyError::Forbidden(Invalidity::Blocked).to_string(),
            "Key is blocked or expired"
        );
        assert_eq!(
            KeyError::Forbidden(Invalidity::Expired).to_string(),
            "Key is blocked or expired"
        );
        assert_eq!(
            KeyError::InvalidArgument("\"blocked\" field must be a boolean").to_string(),
            "Invalid request. \"blocked\" field must be a boolean"
        );
    }
}
