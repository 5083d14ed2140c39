//! Single-flight token refresh.
//!
//! Any number of callers may ask for a refresh at once; at most one refresh
//! request is in flight and every caller receives the outcome of that one
//! cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::state::SessionCell;
use crate::auth::{AuthApi, AuthError, CredentialStore, StoreKey, TokenPair};
use crate::error::CellarError;
use crate::util::retry::RetryPolicy;

/// What a caller should do after asking for a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Redispatch the rejected request with this access token.
    Retry { access: String },
    /// Credentials are gone; fail the request.
    Abort,
}

struct RefreshCycle {
    id: u64,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Coordinates refresh attempts across concurrent callers.
///
/// The refresh itself runs on a spawned task, so a caller dropping its future
/// never cancels a cycle other callers are waiting on.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    api: AuthApi,
    store: Arc<dyn CredentialStore>,
    cell: SessionCell,
    retry: RetryPolicy,
    cycle: Mutex<Option<RefreshCycle>>,
    cycles: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        api: AuthApi,
        store: Arc<dyn CredentialStore>,
        cell: SessionCell,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                cell,
                retry,
                cycle: Mutex::new(None),
                cycles: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a fresh access token, joining the cycle in flight if there is one.
    ///
    /// `rejected` is the access token the backend just refused. When the store
    /// already holds a different token, a cycle finished after that request was
    /// sent and its token is returned without contacting the backend.
    pub async fn request_refresh(&self, rejected: Option<&str>) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut cycle = self.inner.lock_cycle();
            match cycle.as_mut() {
                Some(running) => {
                    tracing::debug!(cycle = running.id, "joining refresh in flight");
                    running.waiters.push(tx);
                }
                None => {
                    if let Some(access) = self.inner.newer_token(rejected) {
                        return RefreshOutcome::Retry { access };
                    }
                    let id = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
                    *cycle = Some(RefreshCycle {
                        id,
                        waiters: vec![tx],
                    });
                    let epoch = self.inner.cell.epoch();
                    tokio::spawn(run_cycle(self.inner.clone(), id, epoch));
                }
            }
        }
        rx.await.unwrap_or(RefreshOutcome::Abort)
    }

    /// Whether a refresh cycle is currently running.
    pub fn in_flight(&self) -> bool {
        self.inner.lock_cycle().is_some()
    }

    /// Number of refresh cycles started since construction.
    pub fn refresh_count(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.inner
            .lock_cycle()
            .as_ref()
            .map_or(0, |cycle| cycle.waiters.len())
    }
}

impl Inner {
    fn lock_cycle(&self) -> MutexGuard<'_, Option<RefreshCycle>> {
        self.cycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored access token, if it is not the one that was rejected.
    /// A request sent without any token counts as stale once a token exists.
    fn newer_token(&self, rejected: Option<&str>) -> Option<String> {
        let current = self.store.load(StoreKey::AccessToken).ok().flatten();
        if current.as_deref() != rejected {
            current
        } else {
            None
        }
    }

    async fn exchange(&self) -> Result<TokenPair, CellarError> {
        let refresh = self
            .store
            .load(StoreKey::RefreshToken)?
            .ok_or(AuthError::MissingRefreshToken)?;
        self.retry
            .execute(|| self.api.refresh_tokens(&refresh))
            .await
    }

    fn fail(&self, id: u64, error: &CellarError) -> RefreshOutcome {
        tracing::warn!(cycle = id, error = %error, "token refresh failed; signing out");
        if let Err(err) = self.store.clear_tokens() {
            tracing::warn!(error = %err, "failed to clear stored tokens");
        }
        self.cell.expire();
        RefreshOutcome::Abort
    }
}

async fn run_cycle(inner: Arc<Inner>, id: u64, epoch: u64) {
    tracing::debug!(cycle = id, "refreshing access token");
    let result = inner.exchange().await;

    let outcome = if inner.cell.epoch() != epoch {
        // Login or logout happened meanwhile; the result belongs to a dead session.
        tracing::debug!(cycle = id, "session changed during refresh; discarding result");
        RefreshOutcome::Abort
    } else {
        match result {
            Ok(pair) => match inner.store.save_tokens(&pair) {
                Ok(()) => {
                    tracing::info!(cycle = id, rotated = pair.refresh.is_some(), "access token refreshed");
                    RefreshOutcome::Retry { access: pair.access }
                }
                Err(err) => inner.fail(id, &CellarError::from(err)),
            },
            Err(err) => inner.fail(id, &err),
        }
    };

    let waiters = inner
        .lock_cycle()
        .take()
        .map(|cycle| cycle.waiters)
        .unwrap_or_default();
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}
