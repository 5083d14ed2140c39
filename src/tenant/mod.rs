//! Active winery selection.
//!
//! The selected winery id is sent with every domain request and persisted so
//! it survives a restart. Only wineries the user is a member of can be chosen.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::auth::{CredentialStore, StoreKey};
use crate::error::CellarError;
use crate::types::{Role, WineryMembership};

#[derive(Debug, Default)]
struct TenantState {
    memberships: Vec<WineryMembership>,
    active: Option<Uuid>,
}

/// Process-wide tenant context shared by the session and the request pipeline.
#[derive(Clone)]
pub struct TenantContext {
    state: Arc<RwLock<TenantState>>,
    store: Arc<dyn CredentialStore>,
}

impl TenantContext {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TenantState::default())),
            store,
        }
    }

    /// The selected winery, falling back to the persisted selection before
    /// memberships have been loaded.
    pub fn active_id(&self) -> Option<Uuid> {
        if let Some(id) = self.read().active {
            return Some(id);
        }
        self.persisted()
    }

    /// Replace the membership list and reconcile the selection with it.
    ///
    /// A persisted selection that is still a membership is kept; otherwise the
    /// first membership in listing order becomes active.
    pub fn set_memberships(&self, memberships: Vec<WineryMembership>) -> Option<Uuid> {
        let persisted = self.persisted();
        let active = persisted
            .filter(|id| memberships.iter().any(|m| m.winery.id == *id))
            .or_else(|| memberships.first().map(|m| m.winery.id));

        {
            let mut state = self.write();
            state.memberships = memberships;
            state.active = active;
        }

        if active != persisted {
            let result = match active {
                Some(id) => self.store.save(StoreKey::ActiveWinery, &id.to_string()),
                None => self.store.clear(StoreKey::ActiveWinery),
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to persist active winery");
            }
        }
        tracing::debug!(active = ?active, "winery memberships loaded");
        active
    }

    /// Switch the active winery. The id must belong to a loaded membership.
    pub fn select(&self, id: Uuid) -> Result<WineryMembership, CellarError> {
        let membership = self
            .read()
            .memberships
            .iter()
            .find(|m| m.winery.id == id)
            .cloned()
            .ok_or_else(|| CellarError::InvalidTenant(id.to_string()))?;

        self.store.save(StoreKey::ActiveWinery, &id.to_string())?;
        self.write().active = Some(id);
        tracing::info!(winery = %membership.winery.name, "active winery selected");
        Ok(membership)
    }

    /// Forget memberships and the selection, including the persisted id.
    pub fn clear(&self) {
        *self.write() = TenantState::default();
        if let Err(err) = self.store.clear(StoreKey::ActiveWinery) {
            tracing::warn!(error = %err, "failed to clear active winery");
        }
    }

    pub fn memberships(&self) -> Vec<WineryMembership> {
        self.read().memberships.clone()
    }

    pub fn active_membership(&self) -> Option<WineryMembership> {
        let state = self.read();
        let active = state.active?;
        state
            .memberships
            .iter()
            .find(|m| m.winery.id == active)
            .cloned()
    }

    pub fn role(&self) -> Option<Role> {
        self.active_membership().map(|m| m.role)
    }

    /// Whether the user administers the active winery.
    pub fn is_admin(&self) -> bool {
        self.role().is_some_and(Role::is_admin)
    }

    fn persisted(&self) -> Option<Uuid> {
        let raw = self.store.load(StoreKey::ActiveWinery).ok().flatten()?;
        match Uuid::parse_str(&raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!("ignoring malformed persisted winery id");
                None
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TenantState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TenantState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
