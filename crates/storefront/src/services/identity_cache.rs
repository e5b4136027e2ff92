//! Short-lived cache of verified identities.
//!
//! Keyed by the hex SHA-256 of the access token so raw tokens never sit in
//! memory longer than the request that carried them.

use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

use titi_core::Identity;

const MAX_ENTRIES: u64 = 10_000;

/// Identity cache with a fixed TTL. A zero TTL disables it.
#[derive(Clone)]
pub struct IdentityCache {
    cache: Option<Cache<String, Identity>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build()
        });
        Self { cache }
    }

    pub async fn get(&self, token: &str) -> Option<Identity> {
        let cache = self.cache.as_ref()?;
        cache.get(&token_key(token)).await
    }

    pub async fn insert(&self, token: &str, identity: Identity) {
        if let Some(cache) = &self.cache {
            cache.insert(token_key(token), identity).await;
        }
    }

    /// Drop the entry for `token`, e.g. on logout.
    pub async fn invalidate(&self, token: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&token_key(token)).await;
        }
    }
}

fn token_key(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use titi_core::PiUid;

    use super::*;

    fn alice() -> Identity {
        Identity {
            uid: PiUid::new("u1"),
            username: "alice".to_string(),
            wallet_address: None,
        }
    }

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache = IdentityCache::new(Duration::from_secs(60));
        cache.insert("tok", alice()).await;
        assert_eq!(cache.get("tok").await, Some(alice()));
        assert_eq!(cache.get("other").await, None);

        cache.invalidate("tok").await;
        assert_eq!(cache.get("tok").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables() {
        let cache = IdentityCache::new(Duration::ZERO);
        cache.insert("tok", alice()).await;
        assert_eq!(cache.get("tok").await, None);
    }

    #[test]
    fn test_key_is_hex_digest() {
        let key = token_key("tok");
        assert_eq!(key.len(), 64);
        assert!(!key.contains("tok"));
    }
}
