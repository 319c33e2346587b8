// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session authentication middleware.
//!
//! The JWT only names a live session; identity and role always come from
//! that session's current state, so a role change or sign-out takes effect
//! on the next request.

use crate::models::Role;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "tutor_session";

/// Session lifetime in seconds (7 days).
pub const SESSION_TTL_SECS: usize = 7 * 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity uid)
    pub sub: String,
    /// Session id in the registry
    pub sid: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from the session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub session_id: String,
    pub uid: String,
    pub email: Option<String>,
    /// `None` when the profile could not be synced; never privileged.
    pub role: Option<Role>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(Role::is_admin)
    }
}

/// Session token from the cookie, else from a `Bearer` header.
pub fn session_token(jar: &CookieJar, request: &Request) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Decode and validate a session JWT.
pub fn decode_jwt(token: &str, signing_key: &[u8]) -> Option<Claims> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Middleware that requires a valid session with a signed-in identity.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(&jar, &request).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims =
        decode_jwt(&token, &state.config.jwt_signing_key).ok_or(StatusCode::UNAUTHORIZED)?;

    let session = state
        .sessions
        .get(&claims.sid)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let snapshot = session.state();
    let identity = snapshot.identity.ok_or(StatusCode::UNAUTHORIZED)?;
    if identity.uid != claims.sub {
        tracing::warn!(sid = %claims.sid, "Session token subject does not match session");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let auth_user = AuthUser {
        session_id: claims.sid,
        uid: identity.uid,
        email: identity.email,
        role: snapshot.role,
    };
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Middleware that requires the admin role. Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, StatusCode> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !user.is_admin() {
        tracing::debug!(uid = %user.uid, role = ?user.role, "Admin route refused");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_jwt(uid: &str, session_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: uid.to_string(),
        sid: session_id.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    #[test]
    fn test_jwt_roundtrip_carries_session() {
        let token = create_jwt("uid-1", "sid-1", KEY).unwrap();
        let claims = decode_jwt(&token, KEY).unwrap();
        assert_eq!(claims.sub, "uid-1");
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.exp - claims.iat, SESSION_TTL_SECS);
    }

    #[test]
    fn test_jwt_rejects_wrong_key() {
        let token = create_jwt("uid-1", "sid-1", KEY).unwrap();
        assert!(decode_jwt(&token, b"another_key_that_is_long_enough").is_none());
    }

    #[test]
    fn test_roleless_user_is_not_admin() {
        let user = AuthUser {
            session_id: "sid".into(),
            uid: "uid".into(),
            email: None,
            role: None,
        };
        assert!(!user.is_admin());
    }
}
