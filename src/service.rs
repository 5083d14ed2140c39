//! The `Cellar` facade: one value wiring store, session, pipeline, tenant and gate.

use std::sync::Arc;

use tokio::sync::{broadcast, OnceCell};
use uuid::Uuid;

use crate::auth::{AuthApi, CredentialStore, FileCredentialStore};
use crate::client::ApiClient;
use crate::config::CellarConfig;
use crate::error::CellarError;
use crate::gate::{NavigationDecision, NavigationGate};
use crate::http::{ApiRequest, HttpTransport, Transport};
use crate::session::{RefreshCoordinator, Session, SessionCell, SessionEvent, SessionState};
use crate::tenant::TenantContext;
use crate::types::{LoginCredentials, Page, RegisterData, User, WineryMembership};

pub const MY_WINERIES_PATH: &str = "/wineries/my-wineries/";

/// Membership pages followed before the listing is treated as malformed.
pub const MAX_MEMBERSHIP_PAGES: u32 = 50;

/// Client-side session for the winery ERP backend.
///
/// # Example
/// ```no_run
/// use cellar::prelude::*;
///
/// # async fn run() -> cellar::Result<()> {
/// let cellar = Cellar::new(CellarConfig::from_env()?)?;
/// cellar.initialize().await;
/// if !cellar.is_authenticated() {
///     cellar.login(&LoginCredentials::new("ana@bodega.test", "secret")).await?;
/// }
/// let _tanks: serde_json::Value = cellar.api().get_json("/equipment/tanks/").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cellar {
    config: CellarConfig,
    store: Arc<dyn CredentialStore>,
    session: Session,
    refresh: RefreshCoordinator,
    tenants: TenantContext,
    client: ApiClient,
    gate: NavigationGate,
    bootstrap_memberships: Arc<OnceCell<()>>,
}

impl Cellar {
    /// Build with the HTTP transport and the file-backed credential store.
    pub fn new(config: CellarConfig) -> Result<Self, CellarError> {
        let transport = HttpTransport::new(config.api_base_url.clone(), config.request_timeout)?;
        let store = FileCredentialStore::new(config.store_config());
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(store)))
    }

    pub fn from_env() -> Result<Self, CellarError> {
        Self::new(CellarConfig::from_env()?)
    }

    /// Build from explicit parts, e.g. an in-memory store or a custom transport.
    pub fn with_parts(
        config: CellarConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let cell = SessionCell::new();
        let api = AuthApi::new(transport.clone());
        let refresh = RefreshCoordinator::new(
            api.clone(),
            store.clone(),
            cell.clone(),
            config.refresh_retry.clone(),
        );
        let tenants = TenantContext::new(store.clone());
        let client = ApiClient::new(
            transport,
            store.clone(),
            tenants.clone(),
            refresh.clone(),
            config.tenant_header.clone(),
        );
        let session = Session::new(api, store.clone(), cell.clone(), refresh.clone(), tenants.clone());
        let gate = NavigationGate::new(cell, config.routes.clone());

        Self {
            config,
            store,
            session,
            refresh,
            tenants,
            client,
            gate,
            bootstrap_memberships: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve the stored session and, when signed in, load memberships.
    ///
    /// Concurrent callers share a single membership load.
    pub async fn initialize(&self) -> SessionState {
        let state = self.session.initialize().await;
        if state.is_authenticated() {
            self.bootstrap_memberships
                .get_or_init(|| async {
                    if self.tenants.memberships().is_empty() {
                        self.refresh_memberships().await;
                    }
                })
                .await;
        }
        state
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub async fn wait_ready(&self) {
        self.session.wait_ready().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, CellarError> {
        let user = self.session.login(credentials).await?;
        self.refresh_memberships().await;
        Ok(user)
    }

    pub async fn register(&self, data: &RegisterData) -> Result<User, CellarError> {
        self.session.register(data).await
    }

    pub fn logout(&self) {
        self.session.logout()
    }

    pub fn select_tenant(&self, id: Uuid) -> Result<WineryMembership, CellarError> {
        self.tenants.select(id)
    }

    /// Reload the user's winery memberships, following every page.
    ///
    /// Failures are logged and never fatal; the stored selection is kept.
    pub async fn refresh_memberships(&self) -> Vec<WineryMembership> {
        match self.fetch_memberships().await {
            Ok(memberships) => {
                self.tenants.set_memberships(memberships.clone());
                memberships
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load winery memberships");
                Vec::new()
            }
        }
    }

    async fn fetch_memberships(&self) -> Result<Vec<WineryMembership>, CellarError> {
        let mut memberships = Vec::new();
        let mut page_number = 1u32;
        loop {
            let request = ApiRequest::get(MY_WINERIES_PATH).query("page", page_number.to_string());
            let page: Page<WineryMembership> = self.client.send(request).await?.json()?;
            memberships.extend(page.results);
            if page.next.is_none() {
                break;
            }
            if page_number >= MAX_MEMBERSHIP_PAGES {
                return Err(CellarError::InvalidState(format!(
                    "membership listing still continues after {MAX_MEMBERSHIP_PAGES} pages"
                )));
            }
            page_number += 1;
        }
        Ok(memberships)
    }

    pub fn memberships(&self) -> Vec<WineryMembership> {
        self.tenants.memberships()
    }

    pub fn active_membership(&self) -> Option<WineryMembership> {
        self.tenants.active_membership()
    }

    /// Authorized request pipeline.
    pub fn api(&self) -> &ApiClient {
        &self.client
    }

    pub fn gate(&self) -> &NavigationGate {
        &self.gate
    }

    /// Check a navigation, waiting for initialization if needed.
    pub async fn guard(&self, location: &str) -> NavigationDecision {
        self.gate.check(location).await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tenants(&self) -> &TenantContext {
        &self.tenants
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn config(&self) -> &CellarConfig {
        &self.config
    }

    /// Number of refresh calls issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh.refresh_count()
    }
}
