// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication client over the Identity Toolkit REST API.
//!
//! Handles:
//! - Email/password sign-in and sign-up
//! - Display name updates
//! - Password reset emails
//! - Google sign-in (authorization code → ID token → `signInWithIdp`)
//! - ID token refresh, which re-publishes the identity to subscribers

use crate::config::Config;
use crate::models::Identity;
use crate::services::identity::{
    IdentityError, IdentityProvider, ProviderConfig, ProviderCredential,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every per-session client.
#[derive(Clone)]
pub struct FirebaseAuthConfig {
    http: reqwest::Client,
    api_key: String,
    google_client_id: String,
    google_client_secret: String,
    identity_toolkit_url: String,
    secure_token_url: String,
    google_token_url: String,
}

impl FirebaseAuthConfig {
    pub fn new(
        api_key: String,
        google_client_id: String,
        google_client_secret: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key,
            google_client_id,
            google_client_secret,
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.firebase_api_key.clone(),
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        )
    }

    /// Point the client at an Auth emulator (`host:port`).
    pub fn with_emulator(mut self, host: &str) -> Self {
        self.identity_toolkit_url = format!("http://{}/identitytoolkit.googleapis.com/v1", host);
        self.secure_token_url = format!("http://{}/securetoken.googleapis.com/v1", host);
        self
    }
}

/// Tokens for the signed-in account.
#[derive(Clone)]
struct SessionTokens {
    id_token: String,
    refresh_token: String,
}

/// Account payload shared by the Identity Toolkit endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    #[serde(alias = "profilePicture")]
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

impl AccountResponse {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone().filter(|s| !s.is_empty()),
            photo_url: self.photo_url.clone().filter(|s| !s.is_empty()),
        }
    }

    fn tokens(&self) -> Option<SessionTokens> {
        Some(SessionTokens {
            id_token: self.id_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map an Identity Toolkit error message (e.g. `WEAK_PASSWORD : Password
/// should be at least 6 characters`) to an [`IdentityError`].
pub fn map_error_code(message: &str) -> IdentityError {
    let code = message.split([' ', ':']).next().unwrap_or_default();
    let detail = message
        .split_once(':')
        .map(|(_, detail)| detail.trim().to_string())
        .unwrap_or_else(|| message.to_string());

    match code {
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => IdentityError::InvalidCredentials,
        "EMAIL_NOT_FOUND" => IdentityError::UnknownAccount,
        "EMAIL_EXISTS" => IdentityError::EmailInUse,
        "WEAK_PASSWORD" => IdentityError::WeakPassword(detail),
        "INVALID_EMAIL" | "MISSING_EMAIL" => IdentityError::InvalidEmail,
        "USER_DISABLED" => IdentityError::Disabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyAttempts,
        "INVALID_IDP_RESPONSE" | "INVALID_CREDENTIAL_OR_PROVIDER_ID" | "FEDERATED_USER_ID_ALREADY_LINKED" => {
            IdentityError::ProviderRejected(message.to_string())
        }
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "INVALID_REFRESH_TOKEN" => {
            IdentityError::NotSignedIn
        }
        _ => IdentityError::Transport(message.to_string()),
    }
}

/// Per-session Firebase Authentication client.
pub struct FirebaseAuthClient {
    config: FirebaseAuthConfig,
    current: watch::Sender<Option<Identity>>,
    tokens: Mutex<Option<SessionTokens>>,
}

impl FirebaseAuthClient {
    pub fn new(config: FirebaseAuthConfig) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            config,
            current,
            tokens: Mutex::new(None),
        }
    }

    fn toolkit_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.config.identity_toolkit_url, method, self.config.api_key
        )
    }

    /// POST a JSON body to an Identity Toolkit method.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, IdentityError> {
        let response = self
            .config
            .http
            .post(self.toolkit_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        Self::check_response_json(response).await
    }

    /// Check response status and parse JSON body, mapping provider error codes.
    async fn check_response_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, IdentityError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => map_error_code(&envelope.error.message),
                Err(_) => IdentityError::Transport(format!("HTTP {}: {}", status, body)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| IdentityError::Transport(format!("Malformed response: {}", e)))
    }

    /// Record a signed-in account and notify subscribers.
    async fn adopt(&self, account: AccountResponse) -> Identity {
        let identity = account.identity();
        if let Some(tokens) = account.tokens() {
            *self.tokens.lock().await = Some(tokens);
        }
        self.current.send_replace(Some(identity.clone()));
        identity
    }

    async fn id_token(&self) -> Result<String, IdentityError> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.id_token.clone())
            .ok_or(IdentityError::NotSignedIn)
    }

    async fn has_refresh_token(&self) -> bool {
        self.tokens.lock().await.is_some()
    }

    async fn set_display_name(&self, display_name: &str) -> Result<Identity, IdentityError> {
        let id_token = self.id_token().await?;
        let account: AccountResponse = self
            .call(
                "update",
                &serde_json::json!({
                    "idToken": id_token,
                    "displayName": display_name,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.adopt(account).await)
    }

    /// Exchange an authorization code for Google tokens.
    async fn exchange_google_code(
        &self,
        credential: &ProviderCredential,
    ) -> Result<GoogleTokenResponse, IdentityError> {
        let response = self
            .config
            .http
            .post(&self.config.google_token_url)
            .form(&[
                ("code", credential.authorization_code.as_str()),
                ("client_id", self.config.google_client_id.as_str()),
                ("client_secret", self.config.google_client_secret.as_str()),
                ("redirect_uri", credential.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Transport(format!("Code exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Google rejected authorization code");
            return Err(IdentityError::ProviderRejected(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IdentityError::Transport(format!("Malformed token response: {}", e)))
    }

    /// Refresh the ID token and re-publish the current identity.
    ///
    /// Subscribers see this as a state change for the same identity.
    async fn refresh_session(&self) -> Result<Identity, IdentityError> {
        let refresh_token = self
            .tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
            .ok_or(IdentityError::NotSignedIn)?;

        let response = self
            .config
            .http
            .post(format!(
                "{}/token?key={}",
                self.config.secure_token_url, self.config.api_key
            ))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Transport(format!("Token refresh failed: {}", e)))?;

        let refreshed: RefreshResponse = Self::check_response_json(response).await?;
        *self.tokens.lock().await = Some(SessionTokens {
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
        });

        let identity = self
            .current
            .borrow()
            .clone()
            .ok_or(IdentityError::NotSignedIn)?;
        self.current.send_replace(Some(identity.clone()));
        tracing::debug!(uid = %identity.uid, "ID token refreshed");
        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let account: AccountResponse = self
            .call(
                "signInWithPassword",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.adopt(account).await)
    }

    async fn sign_in_with_provider(
        &self,
        config: &ProviderConfig,
        credential: &ProviderCredential,
    ) -> Result<Identity, IdentityError> {
        let tokens = self.exchange_google_code(credential).await?;

        let post_body = match (tokens.id_token, tokens.access_token) {
            (Some(id_token), _) => format!(
                "id_token={}&providerId={}",
                id_token, config.provider_id
            ),
            (None, Some(access_token)) => format!(
                "access_token={}&providerId={}",
                access_token, config.provider_id
            ),
            (None, None) => {
                return Err(IdentityError::ProviderRejected(
                    "Token response carried no credential".to_string(),
                ))
            }
        };

        let account: AccountResponse = self
            .call(
                "signInWithIdp",
                &serde_json::json!({
                    "postBody": post_body,
                    "requestUri": credential.redirect_uri,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
            )
            .await?;
        Ok(self.adopt(account).await)
    }

    async fn register(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let account: AccountResponse = self
            .call(
                "signUp",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.adopt(account).await)
    }

    async fn update_display_name(&self, display_name: &str) -> Result<Identity, IdentityError> {
        match self.set_display_name(display_name).await {
            // Expired ID token: refresh once and retry.
            Err(IdentityError::NotSignedIn) if self.has_refresh_token().await => {
                tracing::debug!("ID token rejected, refreshing");
                self.refresh_session().await?;
                self.set_display_name(display_name).await
            }
            other => other,
        }
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &serde_json::json!({
                    "requestType": "PASSWORD_RESET",
                    "email": email,
                }),
            )
            .await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        // ID tokens are stateless; dropping them is the sign-out.
        *self.tokens.lock().await = None;
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}
