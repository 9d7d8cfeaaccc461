//! Unified error type for the ledger, its sync engine and the persistence backends.
//!
//! The first four variants are the user-facing taxonomy: validation, missing
//! entities and forbidden operations are raised synchronously before any state
//! changes, while network failures surface only after an optimistic apply.

use thiserror::Error;

/// Every failure the crate can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input fields; the mutation was not applied.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable reason shown to the user
        message: String,
    },

    /// A referenced category, expense or tenant does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up (`"Category"`, `"Expense"`, `"Tenant"`)
        entity: &'static str,
        /// Identifier or name that was not found
        id: String,
    },

    /// The operation is not allowed on the reserved category.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable reason shown to the user
        message: String,
    },

    /// A persistence call failed, was rejected by the backend, or timed out.
    #[error("Network error: {message}")]
    Network {
        /// Transport or backend failure description
        message: String,
    },

    /// config.toml could not be read or holds invalid values, or the
    /// backend client could not be built from it.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// The local `SQLite` store failed outside of a sync call.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Reading config or writing an export failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override was set but is not valid Unicode.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns true for failures detected only after an optimistic local apply.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::network(format!("request timed out: {value}"))
        } else {
            Self::network(value.to_string())
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity() {
        let err = Error::NotFound {
            entity: "Category",
            id: "cat_1".to_string(),
        };
        assert_eq!(err.to_string(), "Category not found: cat_1");
    }

    #[test]
    fn test_only_network_errors_are_network() {
        assert!(Error::network("offline").is_network());
        assert!(!Error::validation("bad").is_network());
        assert!(!Error::forbidden("reserved").is_network());
    }
}
