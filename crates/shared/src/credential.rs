//! Credential hashing shared by the API key checker and the seeding utility.
//!
//! Grounded in the teacher's `auth::api_key::ApiKeyManager::hash_key` — keys
//! are never stored or logged in plaintext, only their SHA-256 hex digest.

use sha2::{Digest, Sha256};

pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_hex_encoded() {
        let a = hash_key("pmcp_test_key");
        let b = hash_key("pmcp_test_key");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_keys_hash_differently() {
        assert_ne!(hash_key("key-a"), hash_key("key-b"));
    }
}
