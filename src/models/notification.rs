// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification records written by the admin console.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Requested delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationChannels {
    pub email: bool,
    pub whatsapp: bool,
}

impl Default for NotificationChannels {
    fn default() -> Self {
        Self {
            email: true,
            whatsapp: false,
        }
    }
}

/// Stored at `notifications/{studentId}_{sentAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub student_id: String,
    pub student_email: String,
    pub student_phone: String,
    pub student_name: String,
    pub message: String,
    pub channels: NotificationChannels,
    pub sent_at: i64,
    pub status: String,
}

impl NotificationRecord {
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.student_id, self.sent_at)
    }
}

/// Admin request to notify one student.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[validate(length(min = 1))]
    pub student_id: String,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[serde(default)]
    pub channels: NotificationChannels,
}
