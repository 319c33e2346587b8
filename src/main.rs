// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Guitar-tutor API Server
//!
//! Signs users in through Firebase Authentication, keeps their Firestore
//! profiles in sync, and serves the admin console.

use guitar_tutor::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, ProfileStore},
    middleware::auth::SESSION_TTL_SECS,
    services::{
        FirebaseAuthClient, FirebaseAuthConfig, IdentityProvider, MemoryDirectory,
        ProviderFactory,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const LOGIN_ATTEMPT_TTL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting guitar-tutor API");

    let (store, providers): (Arc<dyn ProfileStore>, ProviderFactory) = match config.store_backend
    {
        StoreBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore");

            let mut auth_config = FirebaseAuthConfig::from_config(&config)
                .expect("Failed to build identity client");
            if let Ok(host) = std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
                tracing::info!(host = %host, "Using Firebase Auth emulator");
                auth_config = auth_config.with_emulator(&host);
            }
            let providers: ProviderFactory = Arc::new(move || {
                Arc::new(FirebaseAuthClient::new(auth_config.clone())) as Arc<dyn IdentityProvider>
            });
            (Arc::new(db), providers)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            let directory = MemoryDirectory::new();
            let providers: ProviderFactory = Arc::new(move || {
                Arc::new(directory.provider()) as Arc<dyn IdentityProvider>
            });
            (Arc::new(MemoryStore::new()), providers)
        }
    };
    tracing::info!(backend = store.backend_tag(), "Profile store initialized");

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store, providers));

    // Idle and expired sessions, and stale login failure counts, are dropped periodically
    let sessions = state.sessions.clone();
    let login_attempts = state.login_attempts.clone();
    tokio::spawn(async move {
        let session_ttl = Duration::from_secs(SESSION_TTL_SECS as u64);
        let mut interval = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = sessions.prune(SESSION_PRUNE_INTERVAL, session_ttl);
            if pruned > 0 {
                tracing::debug!(pruned, remaining = sessions.len(), "Pruned sessions");
            }
            let forgotten = login_attempts.prune(LOGIN_ATTEMPT_TTL);
            if forgotten > 0 {
                tracing::debug!(forgotten, remaining = login_attempts.len(), "Pruned login failure counts");
            }
        }
    });

    // Build router
    let app = guitar_tutor::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guitar_tutor=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
