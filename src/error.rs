//! Error types for provisioning workflows.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Status code the secrets service answers with when an item already exists.
pub const CONFLICT_STATUS: u16 = 409;

/// Status code the secrets service answers with for unknown items.
pub const NOT_FOUND_STATUS: u16 = 404;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Secrets service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Input closed before a value was entered")]
    Cancelled,

    #[error("Operator declined to continue")]
    Aborted,

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Engineer registry error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Environment file error: {0}")]
    Env(#[from] dotenvy::Error),
}

impl ProvisionError {
    /// HTTP status reported by the secrets service, if this is an API error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The target already exists remotely. Callers treat this as a benign no-op.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(CONFLICT_STATUS)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(NOT_FOUND_STATUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_recognised_only_for_409() {
        let conflict = ProvisionError::Api {
            status: 409,
            message: "Status 409 Conflict".to_string(),
        };
        let forbidden = ProvisionError::Api {
            status: 403,
            message: "forbidden".to_string(),
        };

        assert!(conflict.is_conflict());
        assert!(!forbidden.is_conflict());
        assert!(!ProvisionError::Cancelled.is_conflict());
        assert_eq!(forbidden.status(), Some(403));
    }
}
