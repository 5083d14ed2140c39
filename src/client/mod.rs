//! Request authorization pipeline.
//!
//! Every domain request goes through [`ApiClient::send`], which attaches the
//! bearer token and tenant header, and recovers once from an expired access
//! token by way of the [`RefreshCoordinator`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::backend::is_token_endpoint;
use crate::auth::{CredentialStore, StoreKey};
use crate::error::CellarError;
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::session::{RefreshCoordinator, RefreshOutcome};
use crate::tenant::TenantContext;

/// Authorized access to the backend API.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    tenants: TenantContext,
    refresh: RefreshCoordinator,
    tenant_header: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        tenants: TenantContext,
        refresh: RefreshCoordinator,
        tenant_header: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            tenants,
            refresh,
            tenant_header: tenant_header.into(),
        }
    }

    /// Dispatch a request and return the successful response.
    ///
    /// A 401 triggers at most one refresh-and-retry. When credentials cannot be
    /// recovered the session is dropped and [`CellarError::SessionExpired`] is
    /// returned; a second 401 after a successful refresh is returned as
    /// [`CellarError::Unauthorized`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, CellarError> {
        if request.bypass {
            return self.transport.execute(request).await?.error_for_status();
        }

        let access = self.store.load(StoreKey::AccessToken)?;
        let prepared = self.authorize(request.clone(), access.as_deref());
        let response = self.transport.execute(prepared).await?;
        if !response.is_unauthorized() || is_token_endpoint(&request.path) {
            return response.error_for_status();
        }

        tracing::debug!(path = %request.path, "request rejected; refreshing credentials");
        match self.refresh.request_refresh(access.as_deref()).await {
            RefreshOutcome::Retry { access } => {
                let retried = self.authorize(request, Some(&access));
                self.transport.execute(retried).await?.error_for_status()
            }
            // The coordinator has already signed the session out.
            RefreshOutcome::Abort => Err(CellarError::SessionExpired(response.message())),
        }
    }

    fn authorize(&self, mut request: ApiRequest, access: Option<&str>) -> ApiRequest {
        match access {
            Some(token) => request = request.bearer(token),
            None => request.remove_header(reqwest::header::AUTHORIZATION.as_str()),
        }
        if let Some(tenant) = self.tenants.active_id() {
            request = request.header(self.tenant_header.as_str(), tenant.to_string());
        }
        request
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CellarError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, CellarError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, CellarError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), CellarError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    pub fn tenants(&self) -> &TenantContext {
        &self.tenants
    }
}
