// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live sessions, one [`SessionManager`] per browser session.

use crate::db::ProfileStore;
use crate::ids::new_session_id;
use crate::models::Role;
use crate::services::identity::IdentityProvider;
use crate::services::profile_sync::ProfileSynchronizer;
use crate::services::session::SessionManager;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a fresh, signed-out provider for each new session.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionManager>>>,
    synchronizer: ProfileSynchronizer,
    factory: ProviderFactory,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ProfileStore>, factory: ProviderFactory) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            synchronizer: ProfileSynchronizer::new(store),
            factory,
        }
    }

    /// Create, initialize and register a new session.
    pub fn open(&self) -> anyhow::Result<(String, Arc<SessionManager>)> {
        let session_id = new_session_id()?;
        let manager = SessionManager::new((self.factory)(), self.synchronizer.clone());
        manager.init();
        self.sessions.insert(session_id.clone(), manager.clone());
        tracing::debug!(sessions = self.sessions.len(), "Session opened");
        Ok((session_id, manager))
    }

    /// A signed-out provider outside any session, for one-off calls such as
    /// an admin-triggered password reset.
    pub fn provider(&self) -> Arc<dyn IdentityProvider> {
        (self.factory)()
    }

    /// An unregistered session without a listener, for signed-out
    /// operations such as a password reset request.
    pub fn ephemeral(&self) -> Arc<SessionManager> {
        SessionManager::new((self.factory)(), self.synchronizer.clone())
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionManager>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Remove a session and stop its listener.
    pub fn close(&self, session_id: &str) -> Option<Arc<SessionManager>> {
        let (_, manager) = self.sessions.remove(session_id)?;
        manager.teardown();
        Some(manager)
    }

    /// Push a role change into every live session signed in as `uid`.
    pub fn apply_role(&self, uid: &str, role: Role) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().apply_role(uid, role))
            .count()
    }

    /// Drop sessions older than `ttl`, and sessions older than `idle` that
    /// hold no identity. A session older than `ttl` has outlived its cookie.
    pub fn prune(&self, idle: Duration, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, manager| {
            let age = manager.age();
            let keep = age < ttl && (manager.state().identity.is_some() || age < idle);
            if !keep {
                manager.teardown();
            }
            keep
        });
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
