use thiserror::Error;

use crate::error::CellarError;

/// Errors raised while reading or writing persisted credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("No refresh token available")]
    MissingRefreshToken,
    #[error("Unsupported credentials file version {0}")]
    UnsupportedVersion(u32),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<AuthError> for CellarError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotLoggedIn => CellarError::NotAuthenticated,
            other => CellarError::Storage(other.to_string()),
        }
    }
}
