// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: owns "who is signed in" for one client session.
//!
//! Lifecycle is explicit: [`SessionManager::new`] → [`SessionManager::init`]
//! (starts the provider listener) → [`SessionManager::subscribe`] →
//! [`SessionManager::teardown`].
//!
//! Every explicit operation and every provider state change funnels into
//! [`SessionManager::sync_profile`], which runs under a per-session mutex and
//! publishes only if no newer run or logout has superseded it.

use crate::error::AuthError;
use crate::models::{Identity, Role};
use crate::services::identity::{
    IdentityError, IdentityProvider, ProviderConfig, ProviderCredential,
};
use crate::services::profile_sync::{ProfileSynchronizer, SyncOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

const TRACE_SYNCING: &str = "Syncing profile...";
const TRACE_READY: &str = "Ready";

/// Published session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// `None` means no privilege, including after a failed sync.
    pub role: Option<Role>,
    pub loading: bool,
    /// Coarse human-readable progress/diagnostic line.
    pub status_trace: String,
    /// Sequence number of the run that produced this state.
    pub version: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            role: None,
            loading: false,
            status_trace: TRACE_READY.to_string(),
            version: 0,
        }
    }
}

impl SessionState {
    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(Role::is_admin)
    }
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    synchronizer: ProfileSynchronizer,
    state: watch::Sender<SessionState>,
    /// Serializes reconcile runs for this session.
    sync_lock: Mutex<()>,
    /// Last sequence number handed out.
    sequence: AtomicU64,
    /// Bumped on sign-out; runs started under an older epoch never publish.
    epoch: AtomicU64,
    /// Highest sequence number published.
    applied: AtomicU64,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
    created_at: Instant,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, synchronizer: ProfileSynchronizer) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            provider,
            synchronizer,
            state,
            sync_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            listener: std::sync::Mutex::new(None),
            created_at: Instant::now(),
        })
    }

    /// Start observing provider state. Every non-null identity is reconciled;
    /// a null identity clears the session. Calling twice is a no-op.
    pub fn init(self: &Arc<Self>) {
        let Ok(mut listener) = self.listener.lock() else {
            return;
        };
        if listener.is_some() {
            return;
        }

        let mut changes = self.provider.subscribe();
        // Deliver the current value too, the way a fresh subscription does.
        changes.mark_changed();
        let manager = Arc::downgrade(self);

        *listener = Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let identity = changes.borrow_and_update().clone();
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                match identity {
                    Some(identity) => {
                        tracing::debug!(uid = %identity.uid, "Provider state changed");
                        // Failures are already recorded in the status trace.
                        let _ = manager.sync_profile(&identity, false).await;
                    }
                    None => manager.clear_identity(),
                }
            }
        }));
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Stop observing provider state.
    pub fn teardown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }

    // ─── Explicit operations ─────────────────────────────────────

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        self.begin("Logging in with email...");
        let identity = match self.provider.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(e) => {
                self.fail(format!("Email Login Error: {}", e));
                return Err(AuthError::InvalidCredentials(e));
            }
        };
        self.accept(&identity, false).await;
        Ok(identity)
    }

    /// Complete a third-party consent flow. Account selection is always
    /// forced, whatever `config` says.
    pub async fn login_with_provider(
        &self,
        config: &ProviderConfig,
        credential: &ProviderCredential,
    ) -> Result<Identity, AuthError> {
        self.begin("Opening Google Login...");
        let config = config.clone().with_account_selection();
        let identity = match self.provider.sign_in_with_provider(&config, credential).await {
            Ok(identity) => identity,
            Err(e) => {
                self.fail(format!("Google Login Error: {}", e));
                return Err(AuthError::ProviderLogin(e));
            }
        };
        self.accept(&identity, false).await;
        Ok(identity)
    }

    /// Create an account, name it, and force a fresh profile.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Identity, AuthError> {
        self.begin("Creating account...");
        let created = async {
            self.provider.register(email, password).await?;
            self.provider.update_display_name(display_name).await
        }
        .await;
        let identity = match created {
            Ok(identity) => identity,
            Err(e) => {
                self.fail(format!("Signup Error: {}", e));
                return Err(AuthError::Registration(e));
            }
        };
        self.accept(&identity, true).await;
        Ok(identity)
    }

    /// Send a reset email. Succeeds identically whether or not the address
    /// is registered.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.set_trace("Sending reset email...");
        match self.provider.send_password_reset(email.trim()).await {
            Ok(()) => {}
            Err(IdentityError::UnknownAccount | IdentityError::Disabled) => {
                tracing::debug!("Password reset requested for unknown or disabled account");
            }
            Err(e) => {
                self.set_trace(format!("Reset Error: {}", e));
                return Err(AuthError::Reset(e));
            }
        }
        self.set_trace("Reset link sent!");
        Ok(())
    }

    /// Clear identity and role. Idempotent.
    pub async fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!(error = %e, "Provider sign-out failed");
        }
        let version = self.next_version();
        self.state.send_modify(|state| {
            state.identity = None;
            state.role = None;
            state.loading = false;
            state.status_trace = "Logged out".to_string();
            state.version = version;
        });
    }

    // ─── Reconciliation ──────────────────────────────────────────

    /// Reconcile `identity` against its stored profile and publish the role.
    ///
    /// On storage failure the identity is still published, with no role, and
    /// the error is returned for the caller to log or ignore.
    pub async fn sync_profile(&self, identity: &Identity, force_new: bool) -> Result<Role, AuthError> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _guard = self.sync_lock.lock().await;

        // A run queued behind a sign-out or a newer run must not touch the
        // published state at all.
        if let Some(reason) = self.superseded(identity, epoch, seq) {
            tracing::debug!(uid = %identity.uid, seq, reason, "Syncing without publishing");
            return self
                .synchronizer
                .sync(identity, force_new)
                .await
                .map(SyncOutcome::role)
                .map_err(AuthError::from);
        }

        let mut previous = String::new();
        self.state.send_modify(|state| {
            previous = std::mem::replace(&mut state.status_trace, TRACE_SYNCING.to_string());
        });
        let result = self.synchronizer.sync(identity, force_new).await;

        if let Some(reason) = self.superseded(identity, epoch, seq) {
            tracing::debug!(uid = %identity.uid, seq, reason, "Discarding sync result");
            self.state.send_if_modified(|state| {
                if state.status_trace != TRACE_SYNCING {
                    return false;
                }
                state.status_trace = previous;
                true
            });
            return result.map(SyncOutcome::role).map_err(AuthError::from);
        }
        self.applied.store(seq, Ordering::SeqCst);

        let (role, trace) = match &result {
            Ok(SyncOutcome::Created(role)) => (Some(*role), format!("Profile Created: {}", role)),
            Ok(SyncOutcome::Loaded(role)) => (Some(*role), format!("Profile Loaded: {}", role)),
            Err(e) => {
                tracing::warn!(uid = %identity.uid, error = %e, "Profile sync failed");
                (None, format!("Sync Error: {}", e))
            }
        };
        tracing::debug!(uid = %identity.uid, trace = %trace, "Session trace");
        self.state.send_modify(|state| {
            state.identity = Some(identity.clone());
            state.role = role;
            state.status_trace = trace;
            state.version = seq;
        });

        result.map(SyncOutcome::role).map_err(AuthError::from)
    }

    /// Update the in-memory role when `uid` is this session's identity.
    /// Returns whether the session was affected.
    pub fn apply_role(&self, uid: &str, role: Role) -> bool {
        if self.state.borrow().uid() != Some(uid) {
            return false;
        }
        let version = self.next_version();
        self.applied.store(version, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.uid() != Some(uid) {
                return false;
            }
            state.role = Some(role);
            state.version = version;
            true
        })
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Why a sync started at `epoch` as run `seq` may no longer publish.
    fn superseded(&self, identity: &Identity, epoch: u64, seq: u64) -> Option<&'static str> {
        let still_current = self
            .provider
            .subscribe()
            .borrow()
            .as_ref()
            .is_some_and(|current| current.uid == identity.uid);
        if self.epoch.load(Ordering::SeqCst) != epoch || !still_current {
            Some("signed out")
        } else if self.applied.load(Ordering::SeqCst) > seq {
            Some("newer run applied")
        } else {
            None
        }
    }

    fn next_version(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Provider-side sign-out observed by the listener.
    fn clear_identity(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.identity.is_none() && state.role.is_none() {
                return false;
            }
            state.identity = None;
            state.role = None;
            true
        });
    }

    async fn accept(&self, identity: &Identity, force_new: bool) {
        if let Err(e) = self.sync_profile(identity, force_new).await {
            // Degraded mode: signed in, no role.
            tracing::debug!(uid = %identity.uid, error = %e, "Signed in without profile");
        }
        self.state.send_modify(|state| state.loading = false);
    }

    fn begin(&self, trace: &str) {
        tracing::debug!(trace, "Session trace");
        self.state.send_modify(|state| {
            state.loading = true;
            state.status_trace = trace.to_string();
        });
    }

    fn fail(&self, trace: String) {
        tracing::debug!(trace = %trace, "Session trace");
        self.state.send_modify(|state| {
            state.loading = false;
            state.status_trace = trace;
        });
    }

    fn set_trace(&self, trace: impl Into<String>) {
        let trace = trace.into();
        tracing::debug!(trace = %trace, "Session trace");
        self.state.send_modify(|state| state.status_trace = trace);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
