//! Convenience re-exports for common use.

pub use crate::auth::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreKey};
pub use crate::client::ApiClient;
pub use crate::config::CellarConfig;
pub use crate::error::{CellarError, Result};
pub use crate::gate::{NavigationDecision, NavigationGate, Navigator, RouteTable};
pub use crate::http::{ApiRequest, ApiResponse, Transport};
pub use crate::service::Cellar;
pub use crate::session::{SessionEvent, SessionState};
pub use crate::types::{LoginCredentials, RegisterData, Role, User, Winery, WineryMembership};
