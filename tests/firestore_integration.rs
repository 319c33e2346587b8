// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed store tests.
//!
//! Tests that talk to Firestore need the emulator:
//!   firebase emulators:start --only firestore
//!   FIRESTORE_EMULATOR_HOST=localhost:8081 cargo test --test firestore_integration

use guitar_tutor::db::{FirestoreDb, ProfileStore, StoreError};
use guitar_tutor::ids::new_document_id;
use guitar_tutor::models::{
    ApplicationStatus, Identity, NewApplication, ProfilePatch, Role, UserProfile,
};
use guitar_tutor::services::ProfileSynchronizer;
use std::sync::Arc;

mod common;
use common::test_db;

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, new_document_id().unwrap())
}

#[tokio::test]
async fn test_offline_store_reports_unavailable() {
    let db = FirestoreDb::new_offline();
    let result = db.get_profile("anyone").await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));
    assert_eq!(db.backend_tag(), "firestore");
}

#[tokio::test]
async fn test_offline_store_fails_sync() {
    let sync = ProfileSynchronizer::new(Arc::new(FirestoreDb::new_offline()));
    let identity = Identity::new("uid-1", Some("a@x.com".into()));
    assert!(sync.sync(&identity, false).await.is_err());
}

#[tokio::test]
async fn test_profile_round_trip() {
    require_emulator!();
    let db = test_db().await;
    let id = unique("user");

    let profile = UserProfile {
        email: format!("{id}@example.com"),
        display_name: "Kim".to_string(),
        role: Role::Student,
        class_count: 4,
        ..Default::default()
    };
    db.set_profile(&id, &profile).await.unwrap();

    let stored = db.get_profile(&id).await.unwrap().unwrap();
    assert_eq!(stored.id.as_deref(), Some(id.as_str()));
    assert_eq!(stored.display_name, "Kim");
    assert_eq!(stored.role, Role::Student);
    assert_eq!(stored.class_count, 4);

    let found = db
        .find_profiles_by_email(&format!("{id}@example.com"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    db.delete_profile(&id).await.unwrap();
    assert!(db.get_profile(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_patch_merges_named_fields_only() {
    require_emulator!();
    let db = test_db().await;
    let id = unique("user");

    let profile = UserProfile {
        display_name: "Kim".to_string(),
        comments: "Keep me".to_string(),
        ..Default::default()
    };
    db.set_profile(&id, &profile).await.unwrap();

    db.update_profile(&id, &ProfilePatch::role(Role::Admin))
        .await
        .unwrap();

    let stored = db.get_profile(&id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Admin);
    assert_eq!(stored.comments, "Keep me");
    assert_eq!(stored.display_name, "Kim");

    db.delete_profile(&id).await.unwrap();
}

#[tokio::test]
async fn test_patch_on_missing_profile_is_not_found() {
    require_emulator!();
    let db = test_db().await;
    let result = db
        .update_profile(&unique("ghost"), &ProfilePatch::role(Role::Admin))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_application_status_update() {
    require_emulator!();
    let db = test_db().await;
    let id = unique("app");

    let application = NewApplication {
        name: "Sam".to_string(),
        email: format!("{id}@example.com"),
        whatsapp: "+15551234567".to_string(),
        timezone: "UTC".to_string(),
        description: String::new(),
    }
    .into_application(1_700_000_000_000);
    db.put_application(&id, &application).await.unwrap();

    db.set_application_status(&id, ApplicationStatus::Approved, 1_700_000_100_000)
        .await
        .unwrap();

    let stored = db.get_application(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ApplicationStatus::Approved);
    assert_eq!(stored.approved_at, Some(1_700_000_100_000));
    assert_eq!(stored.name, "Sam");
}

#[tokio::test]
async fn test_sync_creates_then_loads() {
    require_emulator!();
    let db = test_db().await;
    let sync = ProfileSynchronizer::new(Arc::new(db.clone()));
    let identity = Identity::new(unique("uid"), Some("sync@example.com".into()));

    let first = sync.sync(&identity, false).await.unwrap();
    let second = sync.sync(&identity, false).await.unwrap();

    assert!(matches!(first, guitar_tutor::services::SyncOutcome::Created(Role::User)));
    assert!(matches!(second, guitar_tutor::services::SyncOutcome::Loaded(Role::User)));
    db.delete_profile(&identity.uid).await.unwrap();
}
