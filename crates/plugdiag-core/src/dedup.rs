//! Time-windowed suppression of repeated identical events.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::host::ExpiringCache;
use crate::level::Severity;

/// Default suppression window.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Derive the suppression key for one event.
///
/// The message content is part of the key; keying only on file/line would
/// make dynamically interpolated messages either always or never collide.
/// The message is whitespace-normalized first so cosmetically different
/// renderings of one fault still match.
pub fn dedup_key(plugin_id: &str, severity: Severity, message: &str) -> String {
    let normalized = message.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!(
        "plugdiag:{}:{}:{}",
        plugin_id,
        severity.as_str(),
        hex::encode(hasher.finalize())
    )
}

/// Gate over the host's expiring cache.
///
/// Racing requests may both see an absent record and emit twice; at most
/// one extra duplicate is accepted rather than paying for a transaction.
pub struct DedupGate {
    cache: Arc<dyn ExpiringCache>,
}

impl DedupGate {
    pub fn new(cache: Arc<dyn ExpiringCache>) -> Self {
        Self { cache }
    }

    /// True exactly when no unexpired record exists; records as a side
    /// effect so the next identical call within `ttl` is refused.
    pub fn should_emit(&self, key: &str, ttl: Duration) -> bool {
        if self.cache.get(key).is_some() {
            return false;
        }
        self.cache.set(key, "1", ttl);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryCache;

    fn gate() -> DedupGate {
        DedupGate::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn test_idempotence() {
        let gate = gate();
        let key = dedup_key("acme-forms", Severity::Error, "disk full");

        assert!(gate.should_emit(&key, DEFAULT_DEDUP_TTL));
        assert!(!gate.should_emit(&key, DEFAULT_DEDUP_TTL));
    }

    #[test]
    fn test_reemission_after_expiry() {
        let gate = gate();
        let key = dedup_key("acme-forms", Severity::Error, "disk full");

        assert!(gate.should_emit(&key, Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(gate.should_emit(&key, Duration::from_millis(10)));
    }

    #[test]
    fn test_key_varies_by_content() {
        let a = dedup_key("acme-forms", Severity::Error, "failed on row 1");
        let b = dedup_key("acme-forms", Severity::Error, "failed on row 2");
        let c = dedup_key("acme-forms", Severity::Warning, "failed on row 1");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_normalizes_whitespace() {
        let a = dedup_key("acme-forms", Severity::Error, "disk  full\n");
        let b = dedup_key("acme-forms", Severity::Error, "disk full");
        assert_eq!(a, b);
    }
}
