// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin console routes. Auth and admin gates are applied in routes/mod.rs.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{
    NewStudent, NewUser, NotificationRecord, NotificationRequest, ProfilePatch, Role,
};
use crate::routes::api::{ApplicationEntry, ProfileEntry};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/applications", get(list_applications))
        .route(
            "/admin/applications/{id}/approve",
            post(approve_application),
        )
        .route("/admin/students", get(list_students).post(add_student))
        .route("/admin/students/{id}", patch(update_profile))
        .route("/admin/users", get(list_users).post(add_user))
        .route("/admin/users/{id}", patch(update_profile).delete(delete_user))
        .route("/admin/users/{id}/role", put(set_role))
        .route("/admin/users/{id}/password-reset", post(send_password_reset))
        .route("/admin/notifications", post(send_notification))
}

// ─── Applications ────────────────────────────────────────────

async fn list_applications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ApplicationEntry>>> {
    let applications = state.admin.pending_applications().await?;
    Ok(Json(
        applications
            .into_iter()
            .map(ApplicationEntry::from_stored)
            .collect(),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub application_id: String,
    pub profile_id: String,
    pub already_approved: bool,
}

async fn approve_application(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(application_id): Path<String>,
) -> Result<Json<ApprovalResponse>> {
    let outcome = state.admin.approve_application(&application_id).await?;
    tracing::info!(
        admin = %admin.uid,
        application_id = %application_id,
        already_approved = outcome.already_approved,
        "Approve application"
    );
    Ok(Json(ApprovalResponse {
        application_id,
        profile_id: outcome.profile_id,
        already_approved: outcome.already_approved,
    }))
}

// ─── Roster ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UserListParams {
    /// Exact email match
    #[serde(default)]
    email: Option<String>,
}

async fn list_students(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ProfileEntry>>> {
    let students = state.admin.students().await?;
    Ok(Json(students.into_iter().map(ProfileEntry::from_stored).collect()))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserListParams>,
) -> Result<Json<Vec<ProfileEntry>>> {
    let users = match params.email {
        Some(email) => state.admin.users_by_email(&email).await?,
        None => state.admin.users().await?,
    };
    Ok(Json(users.into_iter().map(ProfileEntry::from_stored).collect()))
}

async fn add_student(
    State(state): State<Arc<AppState>>,
    Json(student): Json<NewStudent>,
) -> Result<(StatusCode, Json<ProfileEntry>)> {
    student.validate()?;
    let (id, profile) = state.admin.add_student(student).await?;
    Ok((StatusCode::CREATED, Json(ProfileEntry::new(id, profile))))
}

async fn add_user(
    State(state): State<Arc<AppState>>,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<ProfileEntry>)> {
    user.validate()?;
    let (id, profile) = state.admin.add_user(user).await?;
    Ok((StatusCode::CREATED, Json(ProfileEntry::new(id, profile))))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> Result<StatusCode> {
    state.admin.update_profile(&user_id, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    state.admin.delete_user(&user_id).await?;
    tracing::info!(admin = %admin.uid, user_id = %user_id, "Delete user");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Roles ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<StatusCode> {
    state.admin.set_role(&user_id, body.role).await?;
    tracing::info!(admin = %admin.uid, user_id = %user_id, role = %body.role, "Set role");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct PasswordResetResponse {
    pub email: String,
}

async fn send_password_reset(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<PasswordResetResponse>)> {
    let email = state.admin.send_password_reset(&user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(PasswordResetResponse { email })))
}

// ─── Notifications ───────────────────────────────────────────

async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotificationRequest>,
) -> Result<(StatusCode, Json<NotificationRecord>)> {
    request.validate()?;
    let record = state.admin.send_notification(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
