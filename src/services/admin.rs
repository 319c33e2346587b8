// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin console operations: role changes, application approval, roster
//! maintenance and notifications.
//!
//! Approval spans two documents and the store offers no multi-document
//! transaction, so it runs as a saga:
//! 1. Read the application (already approved → done)
//! 2. Snapshot any profile at the applicant's email key
//! 3. Write the student profile
//! 4. Mark the application approved
//! 5. On failure of 4, restore the snapshot (or delete the new profile)
//!
//! Approvals of the same application are serialized in-process.

use crate::db::{ProfileStore, StoreError};
use crate::ids::new_document_id;
use crate::models::{
    console_key_for_email, profile_key_for_email, Application, ApplicationStatus, NewApplication,
    NewStudent, NewUser, NotificationRecord, NotificationRequest, ProfilePatch, Role,
    UserProfile,
};
use crate::services::identity::IdentityError;
use crate::services::registry::SessionRegistry;
use crate::time_utils::now_millis;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-application mutex serializing approvals.
pub type ApprovalLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot remove the last remaining admin")]
    LastAdmin,

    #[error(
        "Approval of application {application_id} left profile {profile_id} in place: {cause}"
    )]
    PartialApprovalFailure {
        application_id: String,
        profile_id: String,
        cause: String,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Reset(IdentityError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result of a successful approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// Key of the student profile.
    pub profile_id: String,
    /// The application had been approved by an earlier call.
    pub already_approved: bool,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn ProfileStore>,
    sessions: SessionRegistry,
    approval_locks: ApprovalLocks,
    /// Serializes role changes so the last-admin check cannot race.
    role_lock: Arc<Mutex<()>>,
}

impl AdminService {
    pub fn new(store: Arc<dyn ProfileStore>, sessions: SessionRegistry) -> Self {
        Self {
            store,
            sessions,
            approval_locks: Arc::new(DashMap::new()),
            role_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn require_profile(&self, user_id: &str) -> Result<UserProfile, AdminError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("User {}", user_id)))
    }

    /// Fail with [`AdminError::LastAdmin`] if `profile` is the only admin.
    async fn ensure_other_admin(&self, user_id: &str, profile: &UserProfile) -> Result<(), AdminError> {
        if !profile.role.is_admin() {
            return Ok(());
        }
        let admins = self.store.query_profiles(Some(Role::Admin)).await?;
        let others = admins
            .iter()
            .filter(|admin| admin.id.as_deref() != Some(user_id))
            .count();
        if others == 0 {
            tracing::warn!(user_id, "Refusing to remove the last admin");
            return Err(AdminError::LastAdmin);
        }
        Ok(())
    }

    // ─── Roles ───────────────────────────────────────────────────

    /// Overwrite a profile's role and update any live session signed in as
    /// that user.
    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<(), AdminError> {
        let _guard = self.role_lock.lock().await;
        let profile = self.require_profile(user_id).await?;
        if role != Role::Admin {
            self.ensure_other_admin(user_id, &profile).await?;
        }

        self.store
            .update_profile(user_id, &ProfilePatch::role(role))
            .await?;
        let sessions = self.sessions.apply_role(user_id, role);
        tracing::info!(
            user_id,
            from = %profile.role,
            to = %role,
            sessions,
            "User role changed"
        );
        Ok(())
    }

    // ─── Applications ────────────────────────────────────────────

    /// Store a lead-capture submission as a pending application.
    pub async fn submit_application(
        &self,
        form: NewApplication,
    ) -> Result<(String, Application), AdminError> {
        let id = new_document_id()?;
        let application = form.into_application(now_millis());
        self.store.put_application(&id, &application).await?;
        tracing::info!(application_id = %id, "Application submitted");
        Ok((id, application))
    }

    /// Pending applications, newest first.
    pub async fn pending_applications(&self) -> Result<Vec<Application>, AdminError> {
        let mut applications = self
            .store
            .query_applications(Some(ApplicationStatus::Pending))
            .await?;
        applications.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(applications)
    }

    pub async fn approve_application(
        &self,
        application_id: &str,
    ) -> Result<ApprovalOutcome, AdminError> {
        let lock = self
            .approval_locks
            .entry(application_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let application = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("Application {}", application_id)))?;
        let profile_id = profile_key_for_email(&application.email);

        if application.status == ApplicationStatus::Approved {
            tracing::debug!(application_id, "Application already approved");
            return Ok(ApprovalOutcome {
                profile_id,
                already_approved: true,
            });
        }
        if profile_id.is_empty() {
            return Err(AdminError::NotFound(format!(
                "Email on application {}",
                application_id
            )));
        }

        let prior = self.store.get_profile(&profile_id).await?;
        let now = now_millis();
        let profile = UserProfile::for_application(&application, now);
        self.store.set_profile(&profile_id, &profile).await?;

        let cause = match self
            .store
            .set_application_status(application_id, ApplicationStatus::Approved, now)
            .await
        {
            Ok(()) => {
                tracing::info!(application_id, profile_id = %profile_id, "Application approved");
                return Ok(ApprovalOutcome {
                    profile_id,
                    already_approved: false,
                });
            }
            Err(cause) => cause,
        };

        tracing::warn!(
            application_id,
            profile_id = %profile_id,
            error = %cause,
            "Marking application approved failed, compensating"
        );
        let compensation = match &prior {
            Some(prior) => self.store.set_profile(&profile_id, prior).await,
            None => self.store.delete_profile(&profile_id).await,
        };
        match compensation {
            Ok(()) => Err(AdminError::Storage(cause)),
            Err(compensation_error) => {
                tracing::error!(
                    application_id,
                    profile_id = %profile_id,
                    error = %compensation_error,
                    "Compensation failed"
                );
                Err(AdminError::PartialApprovalFailure {
                    application_id: application_id.to_string(),
                    profile_id,
                    cause: format!("{}; compensation failed: {}", cause, compensation_error),
                })
            }
        }
    }

    // ─── Roster ──────────────────────────────────────────────────

    pub async fn students(&self) -> Result<Vec<UserProfile>, AdminError> {
        Ok(self.store.query_profiles(Some(Role::Student)).await?)
    }

    pub async fn users(&self) -> Result<Vec<UserProfile>, AdminError> {
        Ok(self.store.query_profiles(None).await?)
    }

    pub async fn users_by_email(&self, email: &str) -> Result<Vec<UserProfile>, AdminError> {
        Ok(self.store.find_profiles_by_email(email.trim()).await?)
    }

    pub async fn add_student(&self, student: NewStudent) -> Result<(String, UserProfile), AdminError> {
        let id = console_key_for_email(&student.email);
        let profile = student.into_profile(now_millis());
        self.store.set_profile(&id, &profile).await?;
        tracing::info!(user_id = %id, "Student added");
        Ok((id, profile))
    }

    pub async fn add_user(&self, user: NewUser) -> Result<(String, UserProfile), AdminError> {
        let id = console_key_for_email(&user.email);
        let profile = user.into_profile(now_millis());
        self.store.set_profile(&id, &profile).await?;
        tracing::info!(user_id = %id, role = %profile.role, "User added");
        Ok((id, profile))
    }

    /// Merge `patch` into a profile. A role change goes through
    /// [`AdminService::set_role`].
    pub async fn update_profile(&self, user_id: &str, mut patch: ProfilePatch) -> Result<(), AdminError> {
        if let Some(role) = patch.role.take() {
            self.set_role(user_id, role).await?;
        }
        if patch.is_empty() {
            return Ok(());
        }
        match self.store.update_profile(user_id, &patch).await {
            Ok(()) => {
                tracing::info!(user_id, fields = ?patch.field_paths(), "Profile updated");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                Err(AdminError::NotFound(format!("User {}", user_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), AdminError> {
        let _guard = self.role_lock.lock().await;
        let profile = self.require_profile(user_id).await?;
        self.ensure_other_admin(user_id, &profile).await?;
        self.store.delete_profile(user_id).await?;
        tracing::info!(user_id, "User deleted");
        Ok(())
    }

    /// Send a reset email to the address on a stored profile.
    pub async fn send_password_reset(&self, user_id: &str) -> Result<String, AdminError> {
        let profile = self.require_profile(user_id).await?;
        if profile.email.is_empty() {
            return Err(AdminError::NotFound(format!("Email for user {}", user_id)));
        }
        self.sessions
            .provider()
            .send_password_reset(&profile.email)
            .await
            .map_err(AdminError::Reset)?;
        tracing::info!(user_id, "Password reset email sent");
        Ok(profile.email)
    }

    // ─── Notifications ───────────────────────────────────────────

    /// Record a notification for a student. Delivery is logged only.
    pub async fn send_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationRecord, AdminError> {
        let student = self.require_profile(&request.student_id).await?;
        let record = NotificationRecord {
            student_id: request.student_id,
            student_email: student.email,
            student_phone: student.phone,
            student_name: student.display_name,
            message: request.message,
            channels: request.channels,
            sent_at: now_millis(),
            status: "sent".to_string(),
        };
        self.store.put_notification(&record).await?;

        if record.channels.email && !record.student_email.is_empty() {
            tracing::info!(student_id = %record.student_id, channel = "email", "Notification dispatched");
        }
        if record.channels.whatsapp && !record.student_phone.is_empty() {
            tracing::info!(student_id = %record.student_id, channel = "whatsapp", "Notification dispatched");
        }
        Ok(record)
    }
}
