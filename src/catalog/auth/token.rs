//! Credential storage.
//!
//! The gateway reads the current credential before every call and writes
//! a new one after a successful refresh. Where credentials live between
//! runs is up to the store implementation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Access + refresh credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token stops being valid, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// Tokens must never end up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Holder of the current credential.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<Credential>;
    fn set(&self, credential: Credential);
    /// Drop the local session (log out).
    fn clear(&self);
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            credential: RwLock::new(credential),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    fn set(&self, credential: Credential) {
        *self.credential.write() = Some(credential);
    }

    fn clear(&self) {
        *self.credential.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryTokenStore::default();
        assert!(store.get().is_none());

        store.set(Credential::new("access", "refresh"));
        assert_eq!(store.get().unwrap().access_token, "access");

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential = Credential::new("secret-access", "secret-refresh");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let credential = Credential::new("a", "r").with_expiry(now);
        assert!(credential.is_expired(now));
        assert!(!Credential::new("a", "r").is_expired(now));
    }
}
