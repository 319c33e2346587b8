// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile synchronization: guarantee a stored profile exists for an
//! identity and report the authoritative role.

use crate::db::{ProfileStore, StoreError};
use crate::models::{Identity, Role, UserProfile};
use crate::time_utils::now_millis;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-identity mutex serializing create-vs-load decisions.
pub type SyncLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// What a sync run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A default profile was written.
    Created(Role),
    /// An existing profile was read; nothing was written.
    Loaded(Role),
}

impl SyncOutcome {
    pub fn role(self) -> Role {
        match self {
            SyncOutcome::Created(role) | SyncOutcome::Loaded(role) => role,
        }
    }
}

#[derive(Clone)]
pub struct ProfileSynchronizer {
    store: Arc<dyn ProfileStore>,
    locks: SyncLocks,
}

impl ProfileSynchronizer {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Reconcile `identity` against its stored profile.
    ///
    /// Creation vs. load is decided by record existence alone. With
    /// `force_new` the lookup is skipped and a fresh default profile
    /// overwrites whatever is stored under the identity id.
    pub async fn sync(&self, identity: &Identity, force_new: bool) -> Result<SyncOutcome, StoreError> {
        let lock = self
            .locks
            .entry(identity.uid.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if !force_new {
            if let Some(existing) = self.store.get_profile(&identity.uid).await? {
                tracing::debug!(
                    uid = %identity.uid,
                    role = %existing.role,
                    "Existing profile loaded"
                );
                return Ok(SyncOutcome::Loaded(existing.role));
            }
        }

        let profile = UserProfile::for_identity(identity, now_millis());
        self.store.set_profile(&identity.uid, &profile).await?;
        tracing::info!(
            uid = %identity.uid,
            forced = force_new,
            role = %profile.role,
            "Created new profile"
        );
        Ok(SyncOutcome::Created(profile.role))
    }
}
