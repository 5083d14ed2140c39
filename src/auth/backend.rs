use std::sync::Arc;

use serde::Serialize;

use super::token::TokenPair;
use crate::error::CellarError;
use crate::http::{status_to_error, ApiRequest, Transport};
use crate::types::{LoginCredentials, RegisterData, User};

pub const TOKEN_PATH: &str = "/auth/token/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";
pub const CURRENT_USER_PATH: &str = "/users/me/";
pub const REGISTER_PATH: &str = "/users/register/";

/// Whether `path` is one of the token endpoints.
///
/// Rejections from these endpoints are never answered with a refresh.
pub fn is_token_endpoint(path: &str) -> bool {
    let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
    let trimmed = path[..end].trim_start_matches('/');
    match trimmed.strip_prefix(TOKEN_PATH.trim_matches('/')) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Calls to the authentication endpoints.
///
/// Every request is bypass-marked and sent straight to the transport, so none
/// of them can recurse into the authorization pipeline.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// `POST /auth/token/`
    pub async fn obtain_tokens(&self, credentials: &LoginCredentials) -> Result<TokenPair, CellarError> {
        let request = ApiRequest::post(TOKEN_PATH).json(credentials)?.bypass();
        let response = self.transport.execute(request).await?;
        match response.status {
            200..=299 => response.json(),
            400 | 401 => Err(CellarError::Authentication(response.message())),
            status => Err(status_to_error(status, &response.body)),
        }
    }

    /// `POST /auth/token/refresh/`
    ///
    /// A 401 here means the refresh token itself is invalid or expired.
    pub async fn refresh_tokens(&self, refresh: &str) -> Result<TokenPair, CellarError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&RefreshBody { refresh })?
            .bypass();
        let response = self.transport.execute(request).await?;
        response.error_for_status()?.json()
    }

    /// `GET /users/me/` with an explicit access token.
    pub async fn current_user(&self, access: &str) -> Result<User, CellarError> {
        let request = ApiRequest::get(CURRENT_USER_PATH).bearer(access).bypass();
        let response = self.transport.execute(request).await?;
        response.error_for_status()?.json()
    }

    /// `POST /users/register/`
    pub async fn register(&self, data: &RegisterData) -> Result<User, CellarError> {
        let request = ApiRequest::post(REGISTER_PATH).json(data)?.bypass();
        let response = self.transport.execute(request).await?;
        match response.status {
            200..=299 => response.json(),
            400 => Err(CellarError::Registration(response.message())),
            status => Err(status_to_error(status, &response.body)),
        }
    }
}
