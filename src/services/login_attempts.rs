// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Failed password-login counter.
//!
//! A soft nudge only: after [`RESET_NUDGE_THRESHOLD`] consecutive failures
//! the login response suggests a password reset, but further attempts are
//! never refused. Counts are in memory, reset on success, and forgotten
//! once an address has been quiet for a while.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const RESET_NUDGE_THRESHOLD: u32 = 3;

#[derive(Clone, Default)]
pub struct LoginAttempts {
    failures: Arc<DashMap<String, Failures>>,
}

struct Failures {
    count: u32,
    last: Instant,
}

fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LoginAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the consecutive failure count.
    pub fn record_failure(&self, email: &str) -> u32 {
        let mut entry = self.failures.entry(key(email)).or_insert(Failures {
            count: 0,
            last: Instant::now(),
        });
        entry.count = entry.count.saturating_add(1);
        entry.last = Instant::now();
        entry.count
    }

    pub fn clear(&self, email: &str) {
        self.failures.remove(&key(email));
    }

    pub fn failures(&self, email: &str) -> u32 {
        self.failures
            .get(&key(email))
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    /// Forget addresses whose last failure is at least `max_age` old.
    pub fn prune(&self, max_age: Duration) -> usize {
        let before = self.failures.len();
        self.failures.retain(|_, entry| entry.last.elapsed() < max_age);
        before - self.failures.len()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Whether `attempts` failures warrant the reset call-to-action.
pub fn reset_suggested(attempts: u32) -> bool {
    attempts >= RESET_NUDGE_THRESHOLD
}

/// User-facing message for the `attempts`-th consecutive failure.
pub fn failure_message(reason: &str, attempts: u32) -> String {
    if reset_suggested(attempts) {
        format!(
            "Invalid password. After {} failed attempts, please reset your password.",
            RESET_NUDGE_THRESHOLD
        )
    } else {
        format!(
            "{} ({}/{} failed attempts)",
            reason, attempts, RESET_NUDGE_THRESHOLD
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nudge_only_on_third_failure() {
        let attempts = LoginAttempts::new();
        let messages: Vec<String> = (0..3)
            .map(|_| failure_message("Invalid email or password", attempts.record_failure("a@x.com")))
            .collect();

        assert!(!messages[0].contains("reset your password"));
        assert!(!messages[1].contains("reset your password"));
        assert!(messages[2].contains("reset your password"));
        assert_eq!(messages[1], "Invalid email or password (2/3 failed attempts)");
    }

    #[test]
    fn test_counts_are_per_email_and_case_insensitive() {
        let attempts = LoginAttempts::new();
        attempts.record_failure("A@x.com");
        attempts.record_failure(" a@x.com");
        attempts.record_failure("b@x.com");
        assert_eq!(attempts.failures("a@x.com"), 2);
        attempts.clear("a@X.com");
        assert_eq!(attempts.failures("a@x.com"), 0);
        assert_eq!(attempts.failures("b@x.com"), 1);
    }

    #[test]
    fn test_prune_forgets_quiet_addresses() {
        let attempts = LoginAttempts::new();
        attempts.record_failure("a@x.com");
        attempts.record_failure("b@x.com");

        assert_eq!(attempts.prune(Duration::from_secs(3600)), 0);
        assert_eq!(attempts.failures("a@x.com"), 1);

        assert_eq!(attempts.prune(Duration::ZERO), 2);
        assert!(attempts.is_empty());
        assert_eq!(attempts.failures("a@x.com"), 0);
    }
}
