//! Redelivery dedup for proactive actions
//!
//! Webhooks deliver at-least-once; the same event commonly arrives twice
//! within seconds. A TTL cache of action fingerprints narrows (but does not
//! close) the duplicate window.

use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// TTL cache of executed action fingerprints
pub struct ActionDedupCache {
    entries: Cache<String, ()>,
}

impl ActionDedupCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        Self { entries }
    }

    /// True if the fingerprint was recorded within the TTL
    pub fn seen(&self, fingerprint: &str) -> bool {
        self.entries.get(fingerprint).is_some()
    }

    /// Record a fingerprint as executed
    pub fn record(&self, fingerprint: &str) {
        self.entries.insert(fingerprint.to_string(), ());
    }
}

/// Compute a stable fingerprint from key components
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint(&["u1", "create_contact", "x@y.com"]);
        let b = fingerprint(&["u1", "create_contact", "x@y.com"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_by_part() {
        let a = fingerprint(&["u1", "create_contact", "x@y.com"]);
        let b = fingerprint(&["u2", "create_contact", "x@y.com"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_round_trip() {
        let cache = ActionDedupCache::new(Duration::from_secs(300), 1024);
        let fp = fingerprint(&["u1", "send_email", "a@b.com"]);
        assert!(!cache.seen(&fp));
        cache.record(&fp);
        assert!(cache.seen(&fp));
    }
}
