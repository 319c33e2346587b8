// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory [`ProfileStore`] for tests and local development.
//!
//! Documents are held as raw JSON so every read goes through the same lenient
//! decoding as Firestore documents, and tests can seed malformed records.
//! Faults can be injected per collection to exercise degraded-mode paths.

use crate::db::{collections, ProfileStore, StoreError};
use crate::models::{
    Application, ApplicationStatus, NotificationRecord, ProfilePatch, Role, UserProfile,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Default)]
struct Fault {
    reads: bool,
    /// Writes fail once this many writes to the collection have succeeded.
    writes_after: Option<usize>,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<HashMap<&'static str, Collection>>,
    faults: DashMap<&'static str, Fault>,
    writes: DashMap<&'static str, usize>,
}

/// Shared in-memory document store; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Fault injection ─────────────────────────────────────────

    /// Make reads from `collection` fail.
    pub fn fail_reads(&self, collection: &'static str) {
        self.inner.faults.entry(collection).or_default().reads = true;
    }

    /// Make every further write to `collection` fail.
    pub fn fail_writes(&self, collection: &'static str) {
        let done = self.write_count(collection);
        self.fail_writes_after(collection, done);
    }

    /// Let `collection` accept writes until it has `successful` in total,
    /// then fail the rest.
    pub fn fail_writes_after(&self, collection: &'static str, successful: usize) {
        self.inner.faults.entry(collection).or_default().writes_after = Some(successful);
    }

    /// Clear all injected faults.
    pub fn heal(&self) {
        self.inner.faults.clear();
    }

    // ─── Inspection ──────────────────────────────────────────────

    /// Number of successful writes (set, merge or delete) to `collection`.
    pub fn write_count(&self, collection: &'static str) -> usize {
        self.inner.writes.get(collection).map(|n| *n).unwrap_or(0)
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &'static str) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// Raw stored document, bypassing decoding.
    pub async fn raw(&self, collection: &'static str, id: &str) -> Option<Value> {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Store a raw document, bypassing encoding and faults.
    pub async fn insert_raw(&self, collection: &'static str, id: &str, document: Value) {
        self.inner
            .collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document);
    }

    // ─── Internals ───────────────────────────────────────────────

    fn check_read(&self, collection: &'static str) -> Result<(), StoreError> {
        match self.inner.faults.get(collection) {
            Some(fault) if fault.reads => Err(StoreError::Unavailable(format!(
                "injected read failure on {collection}"
            ))),
            _ => Ok(()),
        }
    }

    fn check_write(&self, collection: &'static str) -> Result<(), StoreError> {
        let limit = self
            .inner
            .faults
            .get(collection)
            .and_then(|fault| fault.writes_after);
        match limit {
            Some(limit) if self.write_count(collection) >= limit => Err(StoreError::Unavailable(
                format!("injected write failure on {collection}"),
            )),
            _ => Ok(()),
        }
    }

    fn record_write(&self, collection: &'static str) {
        *self.inner.writes.entry(collection).or_insert(0) += 1;
    }

    async fn read_doc<T: DeserializeOwned + WithId>(
        &self,
        collection: &'static str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        // Yield so concurrent callers interleave the way remote calls do.
        tokio::task::yield_now().await;
        self.check_read(collection)?;
        let raw = self.raw(collection, id).await;
        raw.map(|value| decode(collection, id, value)).transpose()
    }

    async fn read_all<T: DeserializeOwned + WithId>(
        &self,
        collection: &'static str,
    ) -> Result<Vec<T>, StoreError> {
        tokio::task::yield_now().await;
        self.check_read(collection)?;
        let guard = self.inner.collections.read().await;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        docs.iter()
            .map(|(id, value)| decode(collection, id, value.clone()))
            .collect()
    }

    async fn write_doc<T: Serialize + ?Sized>(
        &self,
        collection: &'static str,
        id: &str,
        document: &T,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.check_write(collection)?;
        let value = serde_json::to_value(document)
            .map_err(|e| StoreError::Unavailable(format!("encode {collection}/{id}: {e}")))?;
        self.inner
            .collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(id.to_string(), value);
        self.record_write(collection);
        Ok(())
    }

    async fn merge_doc<T: Serialize + ?Sized>(
        &self,
        collection: &'static str,
        id: &str,
        fields: &T,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.check_write(collection)?;
        let Value::Object(fields) = serde_json::to_value(fields)
            .map_err(|e| StoreError::Unavailable(format!("encode {collection}/{id}: {e}")))?
        else {
            return Err(StoreError::Unavailable(format!(
                "merge into {collection}/{id} needs an object"
            )));
        };

        let mut guard = self.inner.collections.write().await;
        let document = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        match document {
            Value::Object(existing) => existing.extend(fields),
            other => *other = Value::Object(fields),
        }
        drop(guard);
        self.record_write(collection);
        Ok(())
    }

    async fn delete_doc(&self, collection: &'static str, id: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.check_write(collection)?;
        if let Some(docs) = self.inner.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        self.record_write(collection);
        Ok(())
    }
}

/// Records that carry their document id.
trait WithId {
    fn set_id(&mut self, id: &str);
}

impl WithId for UserProfile {
    fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }
}

impl WithId for Application {
    fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }
}

fn decode<T: DeserializeOwned + WithId>(
    collection: &'static str,
    id: &str,
    value: Value,
) -> Result<T, StoreError> {
    let mut record: T = serde_json::from_value(value)
        .map_err(|e| StoreError::Unavailable(format!("corrupt document {collection}/{id}: {e}")))?;
    record.set_id(id);
    Ok(record)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationStatusUpdate {
    status: ApplicationStatus,
    approved_at: i64,
}

#[async_trait]
impl ProfileStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.read_doc(collections::USERS, id).await
    }

    async fn set_profile(&self, id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.write_doc(collections::USERS, id, profile).await
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        self.merge_doc(collections::USERS, id, patch).await
    }

    async fn query_profiles(&self, role: Option<Role>) -> Result<Vec<UserProfile>, StoreError> {
        let profiles: Vec<UserProfile> = self.read_all(collections::USERS).await?;
        Ok(profiles
            .into_iter()
            .filter(|profile| role.map_or(true, |role| profile.role == role))
            .collect())
    }

    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<UserProfile>, StoreError> {
        let email = email.trim();
        let profiles: Vec<UserProfile> = self.read_all(collections::USERS).await?;
        Ok(profiles
            .into_iter()
            .filter(|profile| profile.email == email)
            .collect())
    }

    async fn delete_profile(&self, id: &str) -> Result<(), StoreError> {
        self.delete_doc(collections::USERS, id).await
    }

    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError> {
        self.read_doc(collections::APPLICATIONS, id).await
    }

    async fn put_application(
        &self,
        id: &str,
        application: &Application,
    ) -> Result<(), StoreError> {
        self.write_doc(collections::APPLICATIONS, id, application)
            .await
    }

    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        at_millis: i64,
    ) -> Result<(), StoreError> {
        let update = ApplicationStatusUpdate {
            status,
            approved_at: at_millis,
        };
        self.merge_doc(collections::APPLICATIONS, id, &update).await
    }

    async fn query_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, StoreError> {
        let applications: Vec<Application> = self.read_all(collections::APPLICATIONS).await?;
        Ok(applications
            .into_iter()
            .filter(|application| status.map_or(true, |status| application.status == status))
            .collect())
    }

    async fn put_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        self.write_doc(collections::NOTIFICATIONS, &record.document_id(), record)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_merge_requires_existing_document() {
        let store = MemoryStore::new();
        let err = store
            .update_profile("ghost", &ProfilePatch::role(Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.write_count(collections::USERS), 0);
    }

    #[tokio::test]
    async fn test_merge_keeps_untouched_fields() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                collections::USERS,
                "u1",
                json!({ "email": "a@x.com", "role": "student", "classCount": 3 }),
            )
            .await;

        store
            .update_profile("u1", &ProfilePatch::role(Role::Admin))
            .await
            .unwrap();

        let raw = store.raw(collections::USERS, "u1").await.unwrap();
        assert_eq!(raw["role"], "admin");
        assert_eq!(raw["classCount"], 3);
        assert_eq!(raw["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_reads_populate_document_id() {
        let store = MemoryStore::new();
        store
            .insert_raw(collections::USERS, "u1", json!({ "role": "student" }))
            .await;
        let profile = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.id.as_deref(), Some("u1"));
        assert_eq!(profile.role, Role::Student);
    }

    #[tokio::test]
    async fn test_write_faults_trigger_after_threshold() {
        let store = MemoryStore::new();
        store.fail_writes_after(collections::USERS, 1);

        store
            .set_profile("u1", &UserProfile::default())
            .await
            .unwrap();
        let err = store
            .set_profile("u2", &UserProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.count(collections::USERS).await, 1);

        store.heal();
        store
            .set_profile("u2", &UserProfile::default())
            .await
            .unwrap();
        assert_eq!(store.count(collections::USERS).await, 2);
    }

    #[tokio::test]
    async fn test_read_faults() {
        let store = MemoryStore::new();
        store.fail_reads(collections::USERS);
        assert!(store.get_profile("u1").await.is_err());
        assert!(store.query_profiles(None).await.is_err());
    }

    #[tokio::test]
    async fn test_non_object_document_is_reported() {
        let store = MemoryStore::new();
        store
            .insert_raw(collections::USERS, "u1", json!("garbage"))
            .await;
        assert!(store.get_profile("u1").await.is_err());
    }
}
