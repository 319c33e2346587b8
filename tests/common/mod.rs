// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use guitar_tutor::config::Config;
use guitar_tutor::db::{FirestoreDb, MemoryStore, ProfileStore};
use guitar_tutor::routes::create_router;
use guitar_tutor::services::{
    IdentityProvider, MemoryDirectory, ProfileSynchronizer, ProviderFactory, SessionManager,
};
use guitar_tutor::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Let spawned provider listeners run to completion.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Provider factory over a shared in-memory directory.
#[allow(dead_code)]
pub fn memory_providers(directory: &MemoryDirectory) -> ProviderFactory {
    let directory = directory.clone();
    Arc::new(move || Arc::new(directory.provider()) as Arc<dyn IdentityProvider>)
}

/// An initialized session manager over `store` and `directory`.
#[allow(dead_code)]
pub fn session(store: &MemoryStore, directory: &MemoryDirectory) -> Arc<SessionManager> {
    let store: Arc<dyn ProfileStore> = Arc::new(store.clone());
    let manager = SessionManager::new(
        Arc::new(directory.provider()),
        ProfileSynchronizer::new(store),
    );
    manager.init();
    manager
}

/// Router plus handles on its in-memory backends.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub directory: MemoryDirectory,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

/// Create a test app with a specific frontend URL.
#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = MemoryStore::new();
    let directory = MemoryDirectory::new();
    let state = Arc::new(AppState::new(
        config,
        Arc::new(store.clone()),
        memory_providers(&directory),
    ));
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        directory,
    }
}

/// Send a JSON request, optionally with a cookie header.
#[allow(dead_code)]
pub async fn send_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// `name=value` of the session cookie from a login response.
#[allow(dead_code)]
pub fn session_cookie(response: &Response) -> String {
    set_cookie_headers(response)
        .into_iter()
        .find(|value| value.starts_with("tutor_session="))
        .and_then(|value| value.split(';').next().map(str::to_string))
        .expect("missing tutor_session cookie")
}

/// Log in over HTTP and return the session cookie.
#[allow(dead_code)]
pub async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let response = send_json(
        &app.router,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "login as {email} failed");
    session_cookie(&response)
}

/// Create an account whose stored profile has `role`, then log in.
#[allow(dead_code)]
pub async fn login_with_role(
    app: &TestApp,
    email: &str,
    role: guitar_tutor::models::Role,
) -> (String, String) {
    let identity = app.directory.add_account(email, "secret123", Some("Test"));
    let profile = guitar_tutor::models::UserProfile {
        email: email.to_string(),
        role,
        ..Default::default()
    };
    app.store.set_profile(&identity.uid, &profile).await.unwrap();
    let cookie = login(app, email, "secret123").await;
    (identity.uid, cookie)
}
