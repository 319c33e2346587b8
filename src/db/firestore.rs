// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`ProfileStore`].
//!
//! Provides typed operations for:
//! - Users (profiles, roles and student scheduling metadata)
//! - Applications (lead-capture submissions)
//! - Notifications (admin-sent notification records)

use crate::db::{collections, ProfileStore, StoreError};
use crate::models::{
    Application, ApplicationStatus, NotificationRecord, ProfilePatch, Role, UserProfile,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Field subset written when an application changes status.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationStatusUpdate {
    status: ApplicationStatus,
    approved_at: i64,
}

fn db_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // The emulator rejects real credentials, so skip the credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| db_error(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| db_error(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client: every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn new_offline() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client
            .as_ref()
            .ok_or_else(|| db_error("Database not connected (offline mode)"))
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    fn backend_tag(&self) -> &'static str {
        "firestore"
    }

    // ─── User Operations ─────────────────────────────────────────

    async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(db_error)
    }

    async fn set_profile(&self, id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(id)
            .object(profile)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        // Firestore's update() upserts; a merge must not resurrect a deleted profile.
        if self.get_profile(id).await?.is_none() {
            return Err(StoreError::not_found(collections::USERS, id));
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(patch.field_paths())
            .in_col(collections::USERS)
            .document_id(id)
            .object(patch)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn query_profiles(&self, role: Option<Role>) -> Result<Vec<UserProfile>, StoreError> {
        let client = self.get_client()?;

        match role {
            Some(role) => client
                .fluent()
                .select()
                .from(collections::USERS)
                .filter(move |q| q.for_all([q.field("role").eq(role.as_str())]))
                .obj()
                .query()
                .await
                .map_err(db_error),
            None => client
                .fluent()
                .select()
                .from(collections::USERS)
                .obj()
                .query()
                .await
                .map_err(db_error),
        }
    }

    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<UserProfile>, StoreError> {
        let email = email.trim().to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .obj()
            .query()
            .await
            .map_err(db_error)
    }

    async fn delete_profile(&self, id: &str) -> Result<(), StoreError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(id)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    // ─── Application Operations ──────────────────────────────────

    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::APPLICATIONS)
            .obj()
            .one(id)
            .await
            .map_err(db_error)
    }

    async fn put_application(
        &self,
        id: &str,
        application: &Application,
    ) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::APPLICATIONS)
            .document_id(id)
            .object(application)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        at_millis: i64,
    ) -> Result<(), StoreError> {
        if self.get_application(id).await?.is_none() {
            return Err(StoreError::not_found(collections::APPLICATIONS, id));
        }

        let update = ApplicationStatusUpdate {
            status,
            approved_at: at_millis,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["status", "approvedAt"])
            .in_col(collections::APPLICATIONS)
            .document_id(id)
            .object(&update)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn query_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, StoreError> {
        let client = self.get_client()?;

        match status {
            Some(status) => client
                .fluent()
                .select()
                .from(collections::APPLICATIONS)
                .filter(move |q| q.for_all([q.field("status").eq(status.as_str())]))
                .obj()
                .query()
                .await
                .map_err(db_error),
            None => client
                .fluent()
                .select()
                .from(collections::APPLICATIONS)
                .obj()
                .query()
                .await
                .map_err(db_error),
        }
    }

    // ─── Notification Operations ─────────────────────────────────

    async fn put_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::NOTIFICATIONS)
            .document_id(record.document_id())
            .object(record)
            .execute()
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_status_update_fields() {
        let update = ApplicationStatusUpdate {
            status: ApplicationStatus::Approved,
            approved_at: 1_700_000_100_000,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "approved", "approvedAt": 1_700_000_100_000i64})
        );

        let back: ApplicationStatusUpdate = serde_json::from_value(value).unwrap();
        assert_eq!(back.status, ApplicationStatus::Approved);
        assert_eq!(back.approved_at, 1_700_000_100_000);
    }
}
