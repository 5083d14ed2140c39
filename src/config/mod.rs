//! Configuration system (layered: code > env > defaults).

use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;

use crate::auth::CredentialStoreConfig;
use crate::error::CellarError;
use crate::gate::RouteTable;
use crate::http::DEFAULT_TENANT_HEADER;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "CELLAR_API_URL";
pub const ENV_HOME: &str = "CELLAR_HOME";
pub const ENV_TIMEOUT_SECS: &str = "CELLAR_TIMEOUT_SECS";
pub const ENV_TENANT_HEADER: &str = "CELLAR_TENANT_HEADER";
pub const ENV_REFRESH_MAX_ATTEMPTS: &str = "CELLAR_REFRESH_MAX_ATTEMPTS";

/// Settings for a [`Cellar`](crate::Cellar) instance.
///
/// ```
/// use std::time::Duration;
/// use cellar::config::CellarConfig;
///
/// let config = CellarConfig::builder()
///     .api_base_url("https://erp.example.com/api/v1")
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.tenant_header, "X-Winery-ID");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct CellarConfig {
    #[builder(into, default = DEFAULT_API_URL.to_string())]
    pub api_base_url: String,
    /// Directory holding `session.toml`.
    #[builder(default = CredentialStoreConfig::default_dir())]
    pub data_dir: PathBuf,
    #[builder(default = Duration::from_secs(DEFAULT_TIMEOUT_SECS))]
    pub request_timeout: Duration,
    #[builder(into, default = DEFAULT_TENANT_HEADER.to_string())]
    pub tenant_header: String,
    /// Retries for transient failures of the refresh call.
    #[builder(default)]
    pub refresh_retry: RetryPolicy,
    #[builder(default)]
    pub routes: RouteTable,
}

impl Default for CellarConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CellarConfig {
    /// Load from environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self, CellarError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CellarError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url.trim().to_string();
        }
        if let Some(home) = lookup(ENV_HOME).filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(home);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout = Duration::from_secs(parse_number(ENV_TIMEOUT_SECS, &secs)?);
        }
        if let Some(header) = lookup(ENV_TENANT_HEADER).filter(|v| !v.trim().is_empty()) {
            config.tenant_header = header.trim().to_string();
        }
        if let Some(attempts) = lookup(ENV_REFRESH_MAX_ATTEMPTS) {
            let attempts = parse_number(ENV_REFRESH_MAX_ATTEMPTS, &attempts)?;
            config.refresh_retry.max_attempts = u32::try_from(attempts.max(1)).map_err(|_| {
                CellarError::Configuration(format!("{ENV_REFRESH_MAX_ATTEMPTS} is too large"))
            })?;
        }

        Ok(config)
    }

    pub fn store_config(&self) -> CredentialStoreConfig {
        CredentialStoreConfig::new(self.data_dir.clone())
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64, CellarError> {
    raw.trim().parse().map_err(|_| {
        CellarError::Configuration(format!("{name} must be a whole number, got {raw:?}"))
    })
}
