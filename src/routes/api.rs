// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes: the signed-in user's own view, and the public application
//! form.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Application, NewApplication, UserProfile};
use crate::services::SessionState;
use crate::time_utils::millis_to_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me", get(get_me))
}

/// Public API routes.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/applications", post(submit_application))
}

// ─── Shared response shapes ──────────────────────────────────

/// A stored profile together with its document id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    pub id: String,
    #[serde(flatten)]
    pub profile: UserProfile,
    /// `createdAt` rendered as RFC3339
    pub created: Option<String>,
}

impl ProfileEntry {
    pub fn new(id: impl Into<String>, profile: UserProfile) -> Self {
        let created = millis_to_rfc3339(profile.created_at);
        Self {
            id: id.into(),
            profile,
            created,
        }
    }

    /// Entry for a profile read back from the store.
    pub fn from_stored(profile: UserProfile) -> Self {
        let id = profile.id.clone().unwrap_or_default();
        Self::new(id, profile)
    }
}

/// A stored application together with its document id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEntry {
    pub id: String,
    #[serde(flatten)]
    pub application: Application,
    /// `submittedAt` rendered as RFC3339
    pub submitted: Option<String>,
}

impl ApplicationEntry {
    pub fn new(id: impl Into<String>, application: Application) -> Self {
        let submitted = millis_to_rfc3339(application.submitted_at);
        Self {
            id: id.into(),
            application,
            submitted,
        }
    }

    pub fn from_stored(application: Application) -> Self {
        let id = application.id.clone().unwrap_or_default();
        Self::new(id, application)
    }
}

// ─── Current user ────────────────────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub session: SessionState,
    /// `None` when the profile is missing or the store is unreachable.
    pub profile: Option<ProfileEntry>,
}

/// Session snapshot plus the stored profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let session = state
        .sessions
        .get(&user.session_id)
        .ok_or(AppError::Unauthorized)?
        .state();

    let profile = match state.store.get_profile(&user.uid).await {
        Ok(profile) => profile.map(|p| ProfileEntry::new(user.uid.clone(), p)),
        Err(e) => {
            tracing::warn!(uid = %user.uid, error = %e, "Profile unavailable for /api/me");
            None
        }
    };

    Ok(Json(MeResponse { session, profile }))
}

// ─── Applications ────────────────────────────────────────────

/// Lead-capture form submission.
async fn submit_application(
    State(state): State<Arc<AppState>>,
    Json(form): Json<NewApplication>,
) -> Result<(StatusCode, Json<ApplicationEntry>)> {
    form.validate()?;
    let (id, application) = state.admin.submit_application(form).await?;
    Ok((StatusCode::CREATED, Json(ApplicationEntry::new(id, application))))
}
