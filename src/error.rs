//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("{0}")]
    InvalidParameterCombination(String),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("The operation '{operation}' is not supported for resource '{resource}'")]
    UnsupportedOperation { resource: String, operation: String },

    #[error("Kling API error: {0}")]
    Transport(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

/// Coarse classification of [`Error`] used by the batch executor and callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    MissingRequiredParameter,
    InvalidParameterCombination,
    InvalidParameter,
    UnsupportedOperation,
    Transport,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::Token(_) | Error::EnvVar(_) => {
                ErrorKind::Configuration
            }
            Error::MissingRequiredParameter(_) => ErrorKind::MissingRequiredParameter,
            Error::InvalidParameterCombination(_) => ErrorKind::InvalidParameterCombination,
            Error::InvalidParameter { .. } | Error::Serialization(_) => {
                ErrorKind::InvalidParameter
            }
            Error::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Error::Transport(_) | Error::Http(_) | Error::Io(_) => ErrorKind::Transport,
        }
    }

    /// Errors raised while turning an item into a request, before any I/O.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingRequiredParameter
                | ErrorKind::InvalidParameterCombination
                | ErrorKind::InvalidParameter
                | ErrorKind::UnsupportedOperation
        )
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
