//! Error types for Cellar.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Cellar operations.
#[derive(Error, Debug)]
pub enum CellarError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The request was rejected even after a retry with freshly refreshed credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Credentials could not be recovered; the session has been signed out.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Login was rejected by the token endpoint.
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Winery {0} is not one of the user's memberships")]
    InvalidTenant(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl CellarError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) | Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::SessionExpired(_) | Self::NotAuthenticated => ErrorCategory::Session,
            Self::InvalidTenant(_) => ErrorCategory::Tenant,
            Self::Registration(_) => ErrorCategory::Validation,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                400 | 422 => ErrorCategory::Validation,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server
        )
    }

    /// Whether the user should be shown a message for this error.
    ///
    /// Bootstrap and refresh-and-retry failures are absorbed; only session loss
    /// and login/registration rejections reach the user.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired(_) | Self::Authentication(_) | Self::Registration(_)
        )
    }

    /// Whether this is an authorization rejection from the backend (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Api { status: 401, .. })
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Session => RecoverySuggestion::Reauthenticate,
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Tenant => RecoverySuggestion::SelectTenant,
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Validation => RecoverySuggestion::FixInput,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

impl From<reqwest::Error> for CellarError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout(0);
        }
        Self::Network(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CellarError>;
