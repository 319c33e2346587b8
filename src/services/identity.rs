// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider contract.
//!
//! One provider instance holds the sign-in state of one client session, the
//! way a browser SDK instance does. State changes are published on a
//! `watch` channel for the lifetime of the instance.

use crate::models::Identity;
use async_trait::async_trait;
use tokio::sync::watch;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Provider-side failures, mapped from provider error codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account exists for this email")]
    UnknownAccount,

    #[error("Email address is already in use")]
    EmailInUse,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("Email address is malformed")]
    InvalidEmail,

    #[error("Account has been disabled")]
    Disabled,

    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    #[error("Provider sign-in was rejected: {0}")]
    ProviderRejected(String),

    #[error("No identity is signed in")]
    NotSignedIn,

    #[error("Identity provider unreachable: {0}")]
    Transport(String),
}

/// Configuration for a third-party consent flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider id as the identity service knows it (e.g. `google.com`)
    pub provider_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub custom_parameters: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Google sign-in that always shows the account chooser.
    pub fn google(client_id: impl Into<String>) -> Self {
        Self {
            provider_id: "google.com".to_string(),
            client_id: client_id.into(),
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            custom_parameters: Vec::new(),
        }
        .with_account_selection()
    }

    /// Force `prompt=select_account` so a cached third-party session is never
    /// reused silently.
    pub fn with_account_selection(mut self) -> Self {
        self.custom_parameters.retain(|(key, _)| key != "prompt");
        self.custom_parameters
            .push(("prompt".to_string(), "select_account".to_string()));
        self
    }

    pub fn forces_account_selection(&self) -> bool {
        self.custom_parameters
            .iter()
            .any(|(key, value)| key == "prompt" && value == "select_account")
    }

    /// Consent page URL for an authorization-code flow.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
            urlencoding::encode(state),
        );
        for (key, value) in &self.custom_parameters {
            url.push('&');
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}

/// Result of a completed consent flow, handed back by the provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    pub authorization_code: String,
    pub redirect_uri: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Email/password sign-in.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Complete a third-party consent flow.
    async fn sign_in_with_provider(
        &self,
        config: &ProviderConfig,
        credential: &ProviderCredential,
    ) -> Result<Identity, IdentityError>;

    /// Create an account and sign it in.
    async fn register(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Set the display name of the signed-in identity.
    async fn update_display_name(&self, display_name: &str) -> Result<Identity, IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Current identity and every later change.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_config_forces_account_selection() {
        let config = ProviderConfig::google("client-123");
        assert!(config.forces_account_selection());

        let url = config.authorization_url("http://localhost:8080/auth/google/callback", "abc");
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("prompt=select_account"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("state=abc"));
    }

    #[test]
    fn test_account_selection_overrides_other_prompts() {
        let mut config = ProviderConfig::google("client-123");
        config.custom_parameters = vec![("prompt".into(), "none".into())];
        assert!(!config.forces_account_selection());

        let config = config.with_account_selection();
        assert!(config.forces_account_selection());
        assert_eq!(config.custom_parameters.len(), 1);
    }
}
