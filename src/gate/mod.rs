//! Navigation gating on session state.
//!
//! Decisions are deferred until the session has finished initializing; after
//! that they are synchronous.

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use url::form_urlencoded;

use crate::session::{SessionCell, SessionEvent};

pub const LOGIN_ROUTE: &str = "/auth/login";
pub const LANDING_ROUTE: &str = "/dashboard";
pub const RETURN_URL_PARAM: &str = "returnUrl";

/// How a location relates to authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Requires an authenticated session.
    Protected,
    /// Only reachable while signed out, like the login page.
    PublicOnly,
    /// Reachable in any state.
    Open,
}

/// Location classification and the two well-known redirect targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    pub public_only: Vec<String>,
    pub open: Vec<String>,
    pub login: String,
    pub landing: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public_only: vec![
                "/auth".to_string(),
                "/auth/login".to_string(),
                "/auth/register".to_string(),
            ],
            open: Vec::new(),
            login: LOGIN_ROUTE.to_string(),
            landing: LANDING_ROUTE.to_string(),
        }
    }
}

impl RouteTable {
    /// Classify a location. Anything not listed is protected.
    pub fn access(&self, location: &str) -> RouteAccess {
        let path = path_of(location);
        if self.open.iter().any(|prefix| matches_prefix(path, prefix)) {
            RouteAccess::Open
        } else if self.public_only.iter().any(|prefix| matches_prefix(path, prefix)) {
            RouteAccess::PublicOnly
        } else {
            RouteAccess::Protected
        }
    }
}

fn path_of(location: &str) -> &str {
    let end = location.find(|c: char| c == '?' || c == '#').unwrap_or(location.len());
    &location[..end]
}

/// Prefix match on segment boundaries: `/auth` matches `/auth/login` but not `/authors`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Redirect { to: String },
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Something that can move the user to another location.
#[async_trait]
pub trait Navigator: Send + Sync + 'static {
    async fn navigate(&self, location: &str);
}

/// Route guard evaluating locations against the session.
#[derive(Clone)]
pub struct NavigationGate {
    cell: SessionCell,
    routes: RouteTable,
}

impl NavigationGate {
    pub fn new(cell: SessionCell, routes: RouteTable) -> Self {
        Self { cell, routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether `location` may be entered, waiting for initialization first.
    pub async fn check(&self, location: &str) -> NavigationDecision {
        self.cell.wait_ready().await;
        self.decide(location)
    }

    /// Decide without waiting. `None` until the session is ready.
    pub fn try_check(&self, location: &str) -> Option<NavigationDecision> {
        self.cell.is_ready().then(|| self.decide(location))
    }

    fn decide(&self, location: &str) -> NavigationDecision {
        let authenticated = self.cell.is_authenticated();
        let decision = match self.routes.access(location) {
            RouteAccess::Protected if !authenticated => NavigationDecision::Redirect {
                to: self.login_location(Some(location)),
            },
            RouteAccess::PublicOnly if authenticated => NavigationDecision::Redirect {
                to: self.routes.landing.clone(),
            },
            _ => NavigationDecision::Allow,
        };
        tracing::trace!(location, ?decision, "navigation checked");
        decision
    }

    /// The login location, carrying `return_to` so the user can be sent back.
    pub fn login_location(&self, return_to: Option<&str>) -> String {
        match return_to {
            Some(location) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(RETURN_URL_PARAM, location)
                    .finish();
                format!("{}?{query}", self.routes.login)
            }
            None => self.routes.login.clone(),
        }
    }

    /// Where to go after a successful login.
    ///
    /// Only in-app paths are honoured; anything that could leave the
    /// application falls back to the landing location.
    pub fn post_login_location(&self, return_url: Option<&str>) -> String {
        match return_url {
            Some(url) if is_safe_return(url) && self.routes.access(url) != RouteAccess::PublicOnly => {
                url.to_string()
            }
            _ => self.routes.landing.clone(),
        }
    }

    /// Send the user to the login location once per session expiry.
    ///
    /// Many requests failing together expire the session once, so this
    /// navigates once however many of them there were.
    pub fn redirect_on_expiry<N: Navigator>(&self, navigator: N) -> JoinHandle<()> {
        let mut events = self.cell.subscribe();
        let login = self.routes.login.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Expired) => {
                        tracing::info!(location = %login, "session expired; redirecting to login");
                        navigator.navigate(&login).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "session events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn is_safe_return(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}
