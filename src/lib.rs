// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Guitar-tutor: sign-in, profile sync and admin console backend
//!
//! This crate provides the backend API for the tutoring site: session
//! handling on top of Firebase Authentication, role-bearing user profiles in
//! Firestore, and the admin console's roster operations.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::ProfileStore;
use services::{AdminService, LoginAttempts, ProviderConfig, ProviderFactory, SessionRegistry};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProfileStore>,
    pub sessions: SessionRegistry,
    pub admin: AdminService,
    pub login_attempts: LoginAttempts,
    /// Consent-flow settings for Google sign-in
    pub google: ProviderConfig,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ProfileStore>, providers: ProviderFactory) -> Self {
        let sessions = SessionRegistry::new(store.clone(), providers);
        let admin = AdminService::new(store.clone(), sessions.clone());
        let google = ProviderConfig::google(config.google_client_id.clone());
        Self {
            config,
            store,
            sessions,
            admin,
            login_attempts: LoginAttempts::new(),
            google,
        }
    }
}
