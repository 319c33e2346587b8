// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod application;
pub mod identity;
pub mod notification;
pub mod profile;

pub use application::{Application, ApplicationStatus, NewApplication};
pub use identity::Identity;
pub use notification::{NotificationChannels, NotificationRecord, NotificationRequest};
pub use profile::{
    console_key_for_email, profile_key_for_email, NewStudent, NewUser, NotificationPrefs,
    ProfilePatch, ProfileStatus, Role, UserProfile, DEFAULT_DISPLAY_NAME,
};
