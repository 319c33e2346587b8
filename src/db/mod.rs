// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile store: document storage keyed by id strings.
//!
//! [`ProfileStore`] is the narrow contract the auth flow and admin console
//! rely on: point reads, full overwrites, field merges, equality queries and
//! deletes. No multi-document transactions are assumed.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::models::{Application, ApplicationStatus, NotificationRecord, ProfilePatch, Role, UserProfile};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const APPLICATIONS: &str = "applications";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Storage failure, kept separate from HTTP errors so callers can choose
/// their own degradation policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },

    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(collection: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            collection,
            id: id.to_string(),
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    /// Short backend name for logs.
    fn backend_tag(&self) -> &'static str;

    // ─── users ───────────────────────────────────────────────────

    async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Full overwrite.
    async fn set_profile(&self, id: &str, profile: &UserProfile) -> Result<(), StoreError>;

    /// Merge `patch` into an existing profile. Fails with
    /// [`StoreError::NotFound`] when the document does not exist.
    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<(), StoreError>;

    /// All profiles, or only those whose stored role equals `role`.
    async fn query_profiles(&self, role: Option<Role>) -> Result<Vec<UserProfile>, StoreError>;

    /// Profiles whose stored email equals `email`.
    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<UserProfile>, StoreError>;

    async fn delete_profile(&self, id: &str) -> Result<(), StoreError>;

    // ─── applications ────────────────────────────────────────────

    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError>;

    async fn put_application(&self, id: &str, application: &Application)
        -> Result<(), StoreError>;

    /// Merge the status transition into an existing application.
    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        at_millis: i64,
    ) -> Result<(), StoreError>;

    async fn query_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, StoreError>;

    // ─── notifications ───────────────────────────────────────────

    async fn put_notification(&self, record: &NotificationRecord) -> Result<(), StoreError>;
}
