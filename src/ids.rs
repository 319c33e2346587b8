// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Random identifiers for sessions and generated documents.

use ring::rand::{SecureRandom, SystemRandom};

/// Session ids carry 256 bits of entropy.
const SESSION_ID_BYTES: usize = 32;
/// Matches the length of auto-generated document ids in the console.
const DOCUMENT_ID_BYTES: usize = 10;

fn random_hex(len: usize) -> anyhow::Result<String> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("system RNG unavailable"))?;
    Ok(hex::encode(bytes))
}

/// Generate an opaque session id.
pub fn new_session_id() -> anyhow::Result<String> {
    random_hex(SESSION_ID_BYTES)
}

/// Generate a document id for records without a natural key.
pub fn new_document_id() -> anyhow::Result<String> {
    random_hex(DOCUMENT_ID_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_hex_and_distinct() {
        let a = new_session_id().unwrap();
        let b = new_session_id().unwrap();
        assert_eq!(a.len(), SESSION_ID_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(new_document_id().unwrap().len(), DOCUMENT_ID_BYTES * 2);
    }
}
