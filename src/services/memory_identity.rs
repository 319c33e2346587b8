// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity provider.
//!
//! [`MemoryDirectory`] is the account database shared by every provider
//! instance; each [`MemoryIdentityProvider`] holds one session's sign-in
//! state. Used by `STORE_BACKEND=memory` and by the tests.

use crate::models::Identity;
use crate::services::identity::{
    IdentityError, IdentityProvider, ProviderConfig, ProviderCredential,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
struct Account {
    identity: Identity,
    password: String,
}

/// Shared account database.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    accounts: Arc<DashMap<String, Account>>,
    consents: Arc<DashMap<String, Identity>>,
    reset_requests: Arc<DashMap<String, usize>>,
    next_uid: Arc<AtomicU64>,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_uid(&self) -> String {
        format!("uid-{}", self.next_uid.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Create a password account and return its identity.
    pub fn add_account(&self, email: &str, password: &str, display_name: Option<&str>) -> Identity {
        let mut identity = Identity::new(self.allocate_uid(), Some(email.trim().to_string()));
        identity.display_name = display_name.map(str::to_string);
        self.accounts.insert(
            email_key(email),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Register what a third-party consent returning `code` resolves to.
    pub fn stage_consent(&self, code: &str, identity: Identity) {
        self.consents.insert(code.to_string(), identity);
    }

    /// Number of reset emails sent to `email`.
    pub fn reset_requests(&self, email: &str) -> usize {
        self.reset_requests
            .get(&email_key(email))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// A fresh, signed-out provider bound to this directory.
    pub fn provider(&self) -> MemoryIdentityProvider {
        let (current, _) = watch::channel(None);
        MemoryIdentityProvider {
            directory: self.clone(),
            current,
        }
    }
}

/// One session's view of a [`MemoryDirectory`].
pub struct MemoryIdentityProvider {
    directory: MemoryDirectory,
    current: watch::Sender<Option<Identity>>,
}

impl MemoryIdentityProvider {
    fn publish(&self, identity: Identity) -> Identity {
        self.current.send_replace(Some(identity.clone()));
        identity
    }

    /// Re-announce a persisted identity, as a page reload or token refresh
    /// would.
    pub fn restore(&self, identity: Identity) {
        self.current.send_replace(Some(identity));
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        tokio::task::yield_now().await;
        let account = self
            .directory
            .accounts
            .get(&email_key(email))
            .map(|entry| entry.clone())
            .ok_or(IdentityError::UnknownAccount)?;
        if account.password != password {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(self.publish(account.identity))
    }

    async fn sign_in_with_provider(
        &self,
        config: &ProviderConfig,
        credential: &ProviderCredential,
    ) -> Result<Identity, IdentityError> {
        tokio::task::yield_now().await;
        let identity = self
            .directory
            .consents
            .get(&credential.authorization_code)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                IdentityError::ProviderRejected(format!(
                    "{} did not recognize the authorization code",
                    config.provider_id
                ))
            })?;
        Ok(self.publish(identity))
    }

    async fn register(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        tokio::task::yield_now().await;
        if !email.contains('@') {
            return Err(IdentityError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.directory.accounts.contains_key(&email_key(email)) {
            return Err(IdentityError::EmailInUse);
        }
        let identity = self.directory.add_account(email, password, None);
        Ok(self.publish(identity))
    }

    async fn update_display_name(&self, display_name: &str) -> Result<Identity, IdentityError> {
        tokio::task::yield_now().await;
        let mut identity = self
            .current
            .borrow()
            .clone()
            .ok_or(IdentityError::NotSignedIn)?;
        identity.display_name = Some(display_name.to_string());
        if let Some(email) = identity.email.as_deref() {
            if let Some(mut account) = self.directory.accounts.get_mut(&email_key(email)) {
                account.identity.display_name = identity.display_name.clone();
            }
        }
        Ok(self.publish(identity))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        tokio::task::yield_now().await;
        let key = email_key(email);
        if !self.directory.accounts.contains_key(&key) {
            return Err(IdentityError::UnknownAccount);
        }
        *self.directory.reset_requests.entry(key).or_insert(0) += 1;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_rules() {
        let directory = MemoryDirectory::new();
        directory.add_account("Ada@Example.com", "secret1", Some("Ada"));
        let provider = directory.provider();

        assert_eq!(
            provider.sign_in("nobody@example.com", "secret1").await,
            Err(IdentityError::UnknownAccount)
        );
        assert_eq!(
            provider.sign_in("ada@example.com", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        );
        let identity = provider.sign_in("ada@example.com", "secret1").await.unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
        assert_eq!(*provider.subscribe().borrow(), Some(identity));
    }

    #[tokio::test]
    async fn test_register_rules() {
        let directory = MemoryDirectory::new();
        let provider = directory.provider();

        assert_eq!(
            provider.register("no-at-sign", "secret1").await,
            Err(IdentityError::InvalidEmail)
        );
        assert!(matches!(
            provider.register("a@x.com", "abc").await,
            Err(IdentityError::WeakPassword(_))
        ));
        provider.register("a@x.com", "secret1").await.unwrap();
        assert_eq!(
            directory.provider().register("A@X.com", "secret2").await,
            Err(IdentityError::EmailInUse)
        );
    }

    #[tokio::test]
    async fn test_providers_share_directory_but_not_state() {
        let directory = MemoryDirectory::new();
        directory.add_account("a@x.com", "secret1", None);
        let first = directory.provider();
        let second = directory.provider();

        first.sign_in("a@x.com", "secret1").await.unwrap();
        assert!(first.subscribe().borrow().is_some());
        assert!(second.subscribe().borrow().is_none());
    }

    #[tokio::test]
    async fn test_password_reset_counts() {
        let directory = MemoryDirectory::new();
        directory.add_account("a@x.com", "secret1", None);
        let provider = directory.provider();

        provider.send_password_reset(" A@x.com ").await.unwrap();
        assert_eq!(directory.reset_requests("a@x.com"), 1);
        assert_eq!(
            provider.send_password_reset("b@x.com").await,
            Err(IdentityError::UnknownAccount)
        );
    }
}
