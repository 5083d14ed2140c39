use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token pair returned by the obtain and refresh endpoints.
///
/// The refresh endpoint rotates refresh tokens, but a response without a
/// `refresh` field keeps the previously stored one.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"..")
            .field("refresh", &self.refresh.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Snapshot of the persisted credentials.
///
/// Either both tokens are absent (logged out), only the refresh token is
/// present (recoverable), or both are present (usable).
///
/// # Example
/// ```
/// use cellar::auth::Credentials;
///
/// let creds = Credentials::new(None, Some("r1".to_string()));
/// assert!(creds.is_recoverable());
/// assert!(!creds.is_usable());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn new(access: Option<String>, refresh: Option<String>) -> Self {
        Self { access, refresh }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }

    pub fn is_usable(&self) -> bool {
        self.access.is_some()
    }

    pub fn is_recoverable(&self) -> bool {
        self.access.is_none() && self.refresh.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &self.access.as_ref().map(|_| ".."))
            .field("refresh", &self.refresh.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// Only used for display; authorization decisions always come from the backend.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::<Utc>::from_timestamp(claim.exp?, 0)
}
