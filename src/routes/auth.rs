// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in, registration, password reset and logout routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::error::{AppError, AuthError, Result};
use crate::middleware::auth::{create_jwt, decode_jwt, SESSION_COOKIE, SESSION_TTL_SECS};
use crate::models::{Identity, Role};
use crate::services::login_attempts::{failure_message, reset_suggested};
use crate::services::{ProviderCredential, SessionManager};
use crate::AppState;

/// Non-HttpOnly hint cookie so the frontend can tell a session exists.
pub const LOGGED_IN_COOKIE: &str = "tutor_logged_in";

/// OAuth `state` lifetime in milliseconds.
const OAUTH_STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/password-reset", post(password_reset))
        .route("/auth/logout", post(logout))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 320))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    pub confirm_password: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, max = 320))]
    pub email: String,
}

/// Session summary returned after sign-in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub identity: Identity,
    pub role: Option<Role>,
    pub status_trace: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ─── Cookies ─────────────────────────────────────────────────────

fn session_cookies(jar: CookieJar, jwt: String, secure: bool) -> CookieJar {
    let max_age = time::Duration::seconds(SESSION_TTL_SECS as i64);
    jar.add(
        Cookie::build((SESSION_COOKIE, jwt))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(max_age),
    )
    .add(
        Cookie::build((LOGGED_IN_COOKIE, "1"))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(max_age),
    )
}

fn clear_session_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.remove(
        Cookie::build(SESSION_COOKIE)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure),
    )
    .remove(
        Cookie::build(LOGGED_IN_COOKIE)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(secure),
    )
}

/// Close the session named by an existing session cookie, if any.
async fn close_previous_session(state: &AppState, jar: &CookieJar) {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return;
    };
    let Some(claims) = decode_jwt(cookie.value(), &state.config.jwt_signing_key) else {
        return;
    };
    if let Some(previous) = state.sessions.close(&claims.sid) {
        previous.logout().await;
    }
}

/// Issue the session cookie for a signed-in session.
fn establish(
    state: &AppState,
    jar: CookieJar,
    session_id: &str,
    session: &SessionManager,
    identity: Identity,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let jwt = create_jwt(&identity.uid, session_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;
    let snapshot = session.state();
    let jar = session_cookies(jar, jwt, state.config.cookies_secure());
    Ok((
        jar,
        Json(SessionResponse {
            identity,
            role: snapshot.role,
            status_trace: snapshot.status_trace,
        }),
    ))
}

// ─── Password sign-in ────────────────────────────────────────────

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    body.validate()?;
    close_previous_session(&state, &jar).await;

    let (session_id, session) = state.sessions.open()?;
    match session.login_with_password(body.email.trim(), &body.password).await {
        Ok(identity) => {
            state.login_attempts.clear(&body.email);
            tracing::info!(uid = %identity.uid, "Password login succeeded");
            establish(&state, jar, &session_id, &session, identity)
        }
        Err(AuthError::InvalidCredentials(e)) => {
            state.sessions.close(&session_id);
            let attempts = state.login_attempts.record_failure(&body.email);
            tracing::info!(attempts, "Password login failed");
            Err(AppError::LoginFailed {
                message: failure_message(&e.to_string(), attempts),
                reset_suggested: reset_suggested(attempts),
            })
        }
        Err(e) => {
            state.sessions.close(&session_id);
            Err(e.into())
        }
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    body.validate()?;
    if body.password != body.confirm_password {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }
    close_previous_session(&state, &jar).await;

    let (session_id, session) = state.sessions.open()?;
    match session
        .register(body.email.trim(), &body.password, body.display_name.trim())
        .await
    {
        Ok(identity) => {
            tracing::info!(uid = %identity.uid, "Account registered");
            establish(&state, jar, &session_id, &session, identity)
        }
        Err(e) => {
            state.sessions.close(&session_id);
            Err(e.into())
        }
    }
}

/// Always answers the same way for registered and unknown addresses.
async fn password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse> {
    body.validate()?;
    state
        .sessions
        .ephemeral()
        .request_password_reset(&body.email)
        .await?;
    state.login_attempts.clear(&body.email);
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If an account exists for this email, a reset link has been sent."
                .to_string(),
        }),
    ))
}

/// Logout - end the session and clear cookies. Idempotent.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    close_previous_session(&state, &jar).await;
    let jar = clear_session_cookies(jar, state.config.cookies_secure());
    (StatusCode::NO_CONTENT, jar)
}

// ─── Google sign-in ──────────────────────────────────────────────

/// Query parameters for starting the consent flow.
#[derive(Deserialize)]
pub struct GoogleStartParams {
    /// Frontend URL to return to. Must be under the configured frontend.
    #[serde(default)]
    redirect_uri: Option<String>,
}

async fn google_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GoogleStartParams>,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .filter(|uri| is_frontend_url(uri, &state.config.frontend_url))
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let (session_id, _) = state.sessions.open()?;
    let oauth_state = sign_oauth_state(
        &frontend_url,
        &session_id,
        now_unix_millis()?,
        &state.config.oauth_state_key,
    )?;
    let auth_url = state
        .google
        .authorization_url(&state.config.google_redirect_uri(), &oauth_state);

    tracing::info!(frontend_url = %frontend_url, "Starting Google sign-in");
    Ok(Redirect::temporary(&auth_url))
}

/// Whether `uri` points into the frontend: the frontend origin and path,
/// followed by nothing or by a path, query or fragment.
fn is_frontend_url(uri: &str, frontend_url: &str) -> bool {
    let frontend_url = frontend_url.trim_end_matches('/');
    match uri.strip_prefix(frontend_url) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

async fn google_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let now = now_unix_millis()?;
    let Some(verified) = verify_oauth_state(&params.state, &state.config.oauth_state_key, now)
    else {
        tracing::warn!("Invalid, expired or tampered OAuth state");
        let redirect = format!("{}?error=invalid_state", state.config.frontend_url);
        return Ok((jar, Redirect::temporary(&redirect)));
    };
    let frontend_url = verified.frontend_url;

    let fail = |jar: CookieJar, error: &str| -> Result<(CookieJar, Redirect)> {
        state.sessions.close(&verified.session_id);
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(error));
        Ok((jar, Redirect::temporary(&redirect)))
    };

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return fail(jar, &error);
    }
    let Some(code) = params.code else {
        return fail(jar, "missing_code");
    };
    let Some(session) = state.sessions.get(&verified.session_id) else {
        return fail(jar, "session_expired");
    };

    let credential = ProviderCredential {
        authorization_code: code,
        redirect_uri: state.config.google_redirect_uri(),
    };
    let identity = match session.login_with_provider(&state.google, &credential).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Google sign-in failed");
            return fail(jar, "login_failed");
        }
    };

    close_previous_session(&state, &jar).await;
    let (jar, _) = establish(&state, jar, &verified.session_id, &session, identity)?;
    tracing::info!("Google sign-in succeeded");
    Ok((jar, Redirect::temporary(&frontend_url)))
}

// ─── OAuth state ─────────────────────────────────────────────────

/// Decoded, verified OAuth `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub frontend_url: String,
    pub session_id: String,
}

fn now_unix_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn state_signature(payload: &str, secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sign `frontend_url|timestamp_hex|session_id` and base64url-encode it with
/// the signature appended.
pub fn sign_oauth_state(
    frontend_url: &str,
    session_id: &str,
    now_millis: u128,
    secret: &[u8],
) -> Result<String> {
    let payload = format!("{}|{:x}|{}", frontend_url, now_millis, session_id);
    let signature = state_signature(&payload, secret)?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature).as_bytes()))
}

/// Verify signature and age of an OAuth state parameter.
pub fn verify_oauth_state(state: &str, secret: &[u8], now_millis: u128) -> Option<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Split from the right so the URL may contain '|'
    let mut parts = state_str.rsplitn(4, '|');
    let signature_hex = parts.next()?;
    let session_id = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}|{}", frontend_url, timestamp_hex, session_id);
    let expected = state_signature(&payload, secret).ok()?;
    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_millis.saturating_sub(issued) > OAUTH_STATE_MAX_AGE_MS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(OAuthState {
        frontend_url: frontend_url.to_string(),
        session_id: session_id.to_string(),
    })
}
