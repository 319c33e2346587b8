// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile schema stored in the `users` collection.
//!
//! The database enforces no schema, so every stored field is decoded through
//! [`lenient`]: a missing or malformed value falls back to the field default
//! instead of failing the whole record. Defaults are the ones a freshly
//! created self-service profile gets.

use crate::models::application::Application;
use crate::models::Identity;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Display name used when the provider supplies none.
pub const DEFAULT_DISPLAY_NAME: &str = "New User";

/// Authorization level. The stored role is the only privilege signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    #[default]
    Active,
    Inactive,
}

/// Channels a student has opted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPrefs {
    pub email: bool,
    pub whatsapp: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            email: true,
            whatsapp: false,
        }
    }
}

/// Stored user profile.
///
/// Scheduling metadata (`class_count` onwards) is owned by the admin console
/// but lives in the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Document id, populated on reads and never written back.
    #[serde(default, alias = "_firestore_id", skip_serializing)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient")]
    pub display_name: String,
    #[serde(rename = "photoURL", default, deserialize_with = "lenient")]
    pub photo_url: String,
    #[serde(default, deserialize_with = "lenient")]
    pub role: Role,
    #[serde(default, deserialize_with = "lenient")]
    pub status: ProfileStatus,
    /// Epoch millis (client clock)
    #[serde(default, deserialize_with = "lenient_millis")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub class_count: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub class_number: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub next_class_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub comments: String,
    #[serde(default, deserialize_with = "lenient")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient")]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub notification_prefs: NotificationPrefs,
    #[serde(
        default,
        deserialize_with = "lenient_opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub approved_at: Option<i64>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: None,
            email: String::new(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            photo_url: String::new(),
            role: Role::User,
            status: ProfileStatus::Active,
            created_at: 0,
            class_count: 0,
            class_number: 0,
            next_class_time: None,
            comments: String::new(),
            phone: String::new(),
            timezone: None,
            notification_prefs: NotificationPrefs::default(),
            approved_at: None,
        }
    }
}

impl UserProfile {
    /// Default self-service profile for a first sign-in.
    pub fn for_identity(identity: &Identity, now_millis: i64) -> Self {
        Self {
            email: identity.email.clone().unwrap_or_default(),
            display_name: identity
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            photo_url: identity.photo_url.clone().unwrap_or_default(),
            created_at: now_millis,
            ..Self::default()
        }
    }

    /// Student profile created when an application is approved.
    pub fn for_application(application: &Application, now_millis: i64) -> Self {
        Self {
            email: application.email.trim().to_string(),
            display_name: application.name.clone(),
            phone: application.whatsapp.clone(),
            timezone: Some(application.timezone.clone()),
            role: Role::Student,
            comments: application.description.clone(),
            notification_prefs: NotificationPrefs {
                email: true,
                whatsapp: true,
            },
            created_at: now_millis,
            approved_at: Some(now_millis),
            ..Self::default()
        }
    }
}

/// Document key for profiles provisioned by an admin from an email address.
pub fn profile_key_for_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Document key the admin console uses for hand-added users and students.
pub fn console_key_for_email(email: &str) -> String {
    email.trim().replace(['.', '@'], "_")
}

fn default_true() -> bool {
    true
}

/// Student added by hand from the admin console.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone: String,
    #[serde(default)]
    pub class_number: u32,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub comments: String,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub whatsapp_notifications: bool,
}

impl NewStudent {
    pub fn into_profile(self, now_millis: i64) -> UserProfile {
        UserProfile {
            email: self.email.trim().to_string(),
            display_name: self.display_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            role: Role::Student,
            class_number: self.class_number,
            timezone: self.timezone,
            comments: self.comments,
            notification_prefs: NotificationPrefs {
                email: self.email_notifications,
                whatsapp: self.whatsapp_notifications,
            },
            created_at: now_millis,
            ..UserProfile::default()
        }
    }
}

/// User added by hand from the admin console.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone: String,
    #[serde(default)]
    pub role: Role,
}

impl NewUser {
    pub fn into_profile(self, now_millis: i64) -> UserProfile {
        UserProfile {
            email: self.email.trim().to_string(),
            display_name: self.display_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            role: self.role,
            created_at: now_millis,
            ..UserProfile::default()
        }
    }
}

/// Partial profile update (merge semantics).
///
/// Only `Some` fields are written; [`ProfilePatch::field_paths`] names them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProfileStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_class_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_prefs: Option<NotificationPrefs>,
}

impl ProfilePatch {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    /// Stored field names this patch will overwrite.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        let mut touch = |present: bool, path: &'static str| {
            if present {
                paths.push(path);
            }
        };
        touch(self.display_name.is_some(), "displayName");
        touch(self.photo_url.is_some(), "photoURL");
        touch(self.role.is_some(), "role");
        touch(self.status.is_some(), "status");
        touch(self.class_count.is_some(), "classCount");
        touch(self.class_number.is_some(), "classNumber");
        touch(self.next_class_time.is_some(), "nextClassTime");
        touch(self.comments.is_some(), "comments");
        touch(self.phone.is_some(), "phone");
        touch(self.timezone.is_some(), "timezone");
        touch(self.notification_prefs.is_some(), "notificationPrefs");
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.field_paths().is_empty()
    }
}

/// Decode a field, substituting its default when the stored value is the
/// wrong shape.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Timestamps are written as epoch millis, but older documents carry
/// server timestamps that decode as RFC3339 strings.
pub(crate) fn lenient_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_millis(deserializer)?.unwrap_or_default())
}

pub(crate) fn lenient_opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => crate::time_utils::rfc3339_to_millis(&s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_take_defaults() {
        let profile: UserProfile = serde_json::from_value(json!({ "email": "a@x.com" })).unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert_eq!(profile.role, Role::User);
        assert_eq!(profile.status, ProfileStatus::Active);
        assert_eq!(profile.class_count, 0);
        assert_eq!(profile.notification_prefs, NotificationPrefs::default());
    }

    #[test]
    fn test_corrupted_fields_take_defaults() {
        let profile: UserProfile = serde_json::from_value(json!({
            "email": 42,
            "role": "superuser",
            "status": ["active"],
            "classCount": "three",
            "notificationPrefs": "yes please",
        }))
        .unwrap();
        assert_eq!(profile.email, "");
        assert_eq!(profile.role, Role::User);
        assert_eq!(profile.status, ProfileStatus::Active);
        assert_eq!(profile.class_count, 0);
        assert!(profile.notification_prefs.email);
    }

    #[test]
    fn test_stored_role_is_read_verbatim() {
        let profile: UserProfile =
            serde_json::from_value(json!({ "role": "student" })).unwrap();
        assert_eq!(profile.role, Role::Student);
    }

    #[test]
    fn test_server_timestamp_strings_decode_to_millis() {
        let profile: UserProfile = serde_json::from_value(json!({
            "createdAt": "2023-11-14T22:13:20Z",
            "approvedAt": 1_700_000_000_000i64,
        }))
        .unwrap();
        assert_eq!(profile.created_at, 1_700_000_000_000);
        assert_eq!(profile.approved_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_stored_field_names_match_console_documents() {
        let profile = UserProfile::for_identity(
            &Identity::new("uid-1", Some("a@x.com".into())).with_display_name("Ada"),
            1,
        );
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["displayName"], "Ada");
        assert_eq!(value["photoURL"], "");
        assert_eq!(value["role"], "user");
        assert_eq!(value["classCount"], 0);
        assert_eq!(value["notificationPrefs"]["whatsapp"], false);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_identity_without_name_gets_placeholder() {
        let profile = UserProfile::for_identity(&Identity::new("uid-2", None), 7);
        assert_eq!(profile.display_name, DEFAULT_DISPLAY_NAME);
        assert_eq!(profile.email, "");
        assert_eq!(profile.created_at, 7);
    }

    #[test]
    fn test_patch_field_paths() {
        let patch = ProfilePatch {
            class_count: Some(4),
            next_class_time: Some("Tue 18:00".into()),
            ..ProfilePatch::default()
        };
        assert_eq!(patch.field_paths(), vec!["classCount", "nextClassTime"]);
        assert!(ProfilePatch::default().is_empty());
        assert_eq!(ProfilePatch::role(Role::Admin).field_paths(), vec!["role"]);
    }

    #[test]
    fn test_document_keys_for_email() {
        assert_eq!(profile_key_for_email(" Ada@Example.com "), "ada@example.com");
        assert_eq!(console_key_for_email("ada.l@example.com"), "ada_l_example_com");
    }

    #[test]
    fn test_console_student_defaults() {
        let student: NewStudent = serde_json::from_value(json!({
            "email": "kim@example.com",
            "displayName": "Kim",
            "classNumber": 3,
        }))
        .unwrap();
        assert!(student.validate().is_ok());
        let profile = student.into_profile(5);
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.class_number, 3);
        assert_eq!(profile.class_count, 0);
        assert!(profile.notification_prefs.email && profile.notification_prefs.whatsapp);
    }

    #[test]
    fn test_console_user_role_defaults_to_user() {
        let user: NewUser = serde_json::from_value(json!({
            "email": "lee@example.com",
            "displayName": "Lee",
        }))
        .unwrap();
        assert_eq!(user.into_profile(1).role, Role::User);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(" Admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }
}
