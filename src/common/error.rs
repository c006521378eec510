use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Location not found: {query}")]
    NotFound { query: String },

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Cache corruption in {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        DomainError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn corruption(key: &str, reason: impl std::fmt::Display) -> Self {
        DomainError::CacheCorruption {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type ApplicationResult<T> = Result<T, ApplicationError>;
