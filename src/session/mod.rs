//! Session lifecycle: bootstrap from stored credentials, login, logout.

pub mod refresh;
pub mod state;

pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use state::{SessionCell, SessionEvent, SessionState};

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::auth::{AuthApi, CredentialStore};
use crate::error::CellarError;
use crate::tenant::TenantContext;
use crate::types::{LoginCredentials, RegisterData, User};

/// Owns the session operations; the state itself lives in [`SessionCell`].
#[derive(Clone)]
pub struct Session {
    api: AuthApi,
    store: Arc<dyn CredentialStore>,
    cell: SessionCell,
    refresh: RefreshCoordinator,
    tenants: TenantContext,
}

impl Session {
    pub fn new(
        api: AuthApi,
        store: Arc<dyn CredentialStore>,
        cell: SessionCell,
        refresh: RefreshCoordinator,
        tenants: TenantContext,
    ) -> Self {
        Self {
            api,
            store,
            cell,
            refresh,
            tenants,
        }
    }

    pub fn cell(&self) -> &SessionCell {
        &self.cell
    }

    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.cell.watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.cell.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }

    pub async fn wait_ready(&self) {
        self.cell.wait_ready().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.cell.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.cell.current_user()
    }

    /// Resolve the session from stored credentials.
    ///
    /// Runs once per process. Later calls wait for the first to finish and
    /// return its result. Failures are never surfaced: any credential that
    /// cannot be validated is cleared and the session ends unauthenticated.
    pub async fn initialize(&self) -> SessionState {
        if !self.cell.begin_initializing() {
            self.cell.wait_ready().await;
            return self.cell.state();
        }

        let epoch = self.cell.epoch();
        let user = match self.restore().await {
            Ok(Some(user)) => Some(user),
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(error = %err, "stored credentials could not be validated");
                None
            }
        };
        if user.is_none() {
            if let Err(err) = self.store.clear_tokens() {
                tracing::debug!(error = %err, "failed to clear stored tokens");
            }
        }

        let email = user.as_ref().map(|user| user.email.clone());
        if self.cell.finish_initializing_since(epoch, user) {
            tracing::info!(email = email.as_deref().unwrap_or_default(), "session restored");
        } else if email.is_some() {
            tracing::info!("logged out during bootstrap; discarding restored session");
        } else {
            tracing::info!("no active session");
        }
        self.cell.state()
    }

    async fn restore(&self) -> Result<Option<User>, CellarError> {
        let credentials = self.store.credentials()?;
        match (credentials.access, credentials.refresh) {
            (None, None) => Ok(None),
            (Some(access), _) => match self.api.current_user(&access).await {
                Ok(user) => Ok(Some(user)),
                Err(err) if err.is_unauthorized() => {
                    tracing::debug!("stored access token rejected; refreshing");
                    self.recover(Some(&access)).await
                }
                Err(err) => Err(err),
            },
            (None, Some(_)) => self.recover(None).await,
        }
    }

    async fn recover(&self, rejected: Option<&str>) -> Result<Option<User>, CellarError> {
        match self.refresh.request_refresh(rejected).await {
            RefreshOutcome::Retry { access } => self.api.current_user(&access).await.map(Some),
            RefreshOutcome::Abort => Ok(None),
        }
    }

    /// Exchange email and password for a session.
    ///
    /// Nothing is persisted and the state is untouched unless both the token
    /// exchange and the user lookup succeed.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, CellarError> {
        if self.cell.state() == SessionState::Initializing {
            self.cell.wait_ready().await;
        }

        let tokens = self.api.obtain_tokens(credentials).await?;
        let user = self.api.current_user(&tokens.access).await?;

        self.store.save_tokens(&tokens)?;
        self.cell.authenticate(user.clone());
        tracing::info!(email = %user.email, "logged in");
        Ok(user)
    }

    /// Drop credentials and the tenant selection. Safe to call repeatedly.
    pub fn logout(&self) {
        if let Err(err) = self.store.clear_tokens() {
            tracing::warn!(error = %err, "failed to clear stored tokens");
        }
        self.tenants.clear();
        if self.cell.sign_out() {
            tracing::info!("logged out");
        }
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, data: &RegisterData) -> Result<User, CellarError> {
        let user = self.api.register(data).await?;
        tracing::info!(email = %user.email, "account registered");
        Ok(user)
    }
}
