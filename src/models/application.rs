// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lead-capture ("expression of interest") applications.

use crate::models::profile::{lenient, lenient_millis, lenient_opt_millis};
use serde::{Deserialize, Serialize};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
        }
    }
}

/// Stored application, one document per submission in `applications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, alias = "_firestore_id", skip_serializing)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient")]
    pub whatsapp: String,
    #[serde(default, deserialize_with = "lenient")]
    pub timezone: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub status: ApplicationStatus,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub submitted_at: i64,
    #[serde(
        default,
        deserialize_with = "lenient_opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub approved_at: Option<i64>,
}

/// Public form submission.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 5, max = 32))]
    pub whatsapp: String,
    #[validate(length(min = 1, max = 64))]
    pub timezone: String,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub description: String,
}

impl NewApplication {
    pub fn into_application(self, now_millis: i64) -> Application {
        Application {
            id: None,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            whatsapp: self.whatsapp.trim().to_string(),
            timezone: self.timezone,
            description: self.description,
            status: ApplicationStatus::Pending,
            submitted_at: now_millis,
            approved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> NewApplication {
        NewApplication {
            name: " Jimi ".into(),
            email: "jimi@example.com".into(),
            whatsapp: "+15550100".into(),
            timezone: "America/Los_Angeles".into(),
            description: "Blues, mostly".into(),
        }
    }

    #[test]
    fn test_new_application_is_pending() {
        let application = form().into_application(99);
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.name, "Jimi");
        assert_eq!(application.submitted_at, 99);
        assert_eq!(application.approved_at, None);
    }

    #[test]
    fn test_form_validation() {
        assert!(form().validate().is_ok());

        let mut bad = form();
        bad.email = "not-an-email".into();
        assert!(bad.validate().is_err());

        let mut empty = form();
        empty.name = String::new();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_unknown_status_reads_as_pending() {
        let application: Application =
            serde_json::from_value(json!({ "email": "a@x.com", "status": "rejected" })).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
    }
}
