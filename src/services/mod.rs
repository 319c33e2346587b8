// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod admin;
pub mod firebase_auth;
pub mod identity;
pub mod login_attempts;
pub mod memory_identity;
pub mod profile_sync;
pub mod registry;
pub mod session;

pub use admin::{AdminError, AdminService, ApprovalOutcome};
pub use firebase_auth::{FirebaseAuthClient, FirebaseAuthConfig};
pub use identity::{IdentityError, IdentityProvider, ProviderConfig, ProviderCredential};
pub use login_attempts::LoginAttempts;
pub use memory_identity::{MemoryDirectory, MemoryIdentityProvider};
pub use profile_sync::{ProfileSynchronizer, SyncOutcome};
pub use registry::{ProviderFactory, SessionRegistry};
pub use session::{SessionManager, SessionState};
