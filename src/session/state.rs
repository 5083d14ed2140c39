//! Observable session state and its transition rules.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::types::User;

const EVENT_CAPACITY: usize = 16;

/// Authentication state of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// `initialize` has not been called yet.
    Uninitialized,
    /// Stored credentials are being validated.
    Initializing,
    Authenticated(User),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Transition notifications; emitted only when the state actually changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    LoggedOut,
    /// Credentials could not be refreshed and the session was dropped.
    Expired,
}

/// Shared holder of [`SessionState`], the ready signal, and the session epoch.
///
/// Cloning is cheap; all clones observe the same state. Transitions are only
/// reachable from inside the crate, so the session and the refresh coordinator
/// are its only writers.
#[derive(Clone)]
pub struct SessionCell {
    inner: Arc<CellInner>,
}

struct CellInner {
    state: watch::Sender<SessionState>,
    ready: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
    epoch: AtomicU64,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (ready, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CellInner {
                state,
                ready,
                events,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Resolve once initialization has finished; immediately if it already has.
    pub async fn wait_ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Incremented on every login and logout.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Uninitialized → Initializing. Returns `false` if initialization already started.
    pub(crate) fn begin_initializing(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Uninitialized {
                *state = SessionState::Initializing;
                true
            } else {
                false
            }
        })
    }

    /// Initializing → Authenticated | Unauthenticated, then fire the ready signal.
    pub(crate) fn finish_initializing(&self, user: Option<User>) {
        self.resolve_initializing(user, None);
    }

    /// Like [`finish_initializing`](Self::finish_initializing), but a user is
    /// only accepted while the epoch still equals `epoch`. A logout during
    /// bootstrap therefore always ends unauthenticated. Returns whether the
    /// session ended authenticated.
    pub(crate) fn finish_initializing_since(&self, epoch: u64, user: Option<User>) -> bool {
        self.resolve_initializing(user, Some(epoch))
    }

    fn resolve_initializing(&self, user: Option<User>, epoch: Option<u64>) -> bool {
        // The epoch is read under the state lock: a concurrent sign_out either
        // bumps it before this check or drops the authentication afterwards.
        self.inner.state.send_if_modified(|state| {
            if *state != SessionState::Initializing {
                return false;
            }
            let current = epoch.map_or(true, |epoch| self.epoch() == epoch);
            *state = match user {
                Some(user) if current => SessionState::Authenticated(user),
                _ => SessionState::Unauthenticated,
            };
            true
        });
        self.mark_ready();
        self.is_authenticated()
    }

    fn mark_ready(&self) {
        self.inner.ready.send_if_modified(|ready| {
            let changed = !*ready;
            *ready = true;
            changed
        });
    }

    /// Explicit login. Also resolves readiness if login preceded initialization.
    pub(crate) fn authenticate(&self, user: User) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner
            .state
            .send_replace(SessionState::Authenticated(user.clone()));
        self.mark_ready();
        let _ = self.inner.events.send(SessionEvent::LoggedIn(user));
    }

    /// Explicit logout. Returns whether a transition happened.
    pub(crate) fn sign_out(&self) -> bool {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let changed = self.drop_authentication();
        if changed {
            let _ = self.inner.events.send(SessionEvent::LoggedOut);
        }
        changed
    }

    /// Irrecoverable refresh failure. Only an authenticated session can expire,
    /// so concurrent failures produce a single [`SessionEvent::Expired`].
    pub(crate) fn expire(&self) -> bool {
        let changed = self.drop_authentication();
        if changed {
            tracing::info!("session expired");
            let _ = self.inner.events.send(SessionEvent::Expired);
        }
        changed
    }

    fn drop_authentication(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = SessionState::Unauthenticated;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing;
    use std::time::Duration;

    fn user() -> User {
        testing::user("ana@bodega.test")
    }

    #[test]
    fn initialization_happens_once() {
        let cell = SessionCell::new();
        assert!(cell.begin_initializing());
        assert!(!cell.begin_initializing());
        assert!(!cell.is_ready());

        cell.finish_initializing(None);
        assert!(cell.is_ready());
        assert_eq!(cell.state(), SessionState::Unauthenticated);

        assert!(!cell.begin_initializing());
        cell.finish_initializing(Some(user()));
        assert_eq!(cell.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn expire_only_fires_for_authenticated_sessions() {
        let cell = SessionCell::new();
        let mut events = cell.subscribe();
        assert!(!cell.expire());

        cell.authenticate(user());
        assert!(cell.expire());
        assert!(!cell.expire());

        assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedIn(_))));
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Expired));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn sign_out_bumps_epoch_even_without_transition() {
        let cell = SessionCell::new();
        let before = cell.epoch();
        assert!(!cell.sign_out());
        assert_eq!(cell.epoch(), before + 1);
        assert_eq!(cell.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn wait_ready_blocks_until_initialization_finishes() {
        let cell = SessionCell::new();
        cell.begin_initializing();

        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        cell.finish_initializing(Some(user()));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("ready fired")
            .unwrap();
        assert!(cell.is_authenticated());
    }
}
