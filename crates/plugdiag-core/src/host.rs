//! Collaborator interfaces provided by the host process.
//!
//! The facility never talks to the host platform directly; everything it
//! needs arrives through these traits at construction time. In-memory
//! implementations ship alongside for tests and for embedding in hosts
//! that have no native equivalent.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Expiring key-value cache backing the dedup gate.
///
/// Entries become invisible after their TTL. Last-writer-wins, no
/// transactions; a race between concurrent requests may let one extra
/// duplicate through, which is accepted.
pub trait ExpiringCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, ttl: Duration);
}

/// Durable settings store for last-log-time / last-viewed-time bookkeeping.
pub trait SettingsStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn delete(&self, name: &str);
}

/// A raw error reported by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    /// Platform error code (see [`crate::handler::severity_for_code`])
    pub code: u32,

    /// Raw error message
    pub message: String,

    /// Faulting file, when the platform knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Faulting line, when the platform knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Process-end primitives the shutdown handler consumes.
///
/// Mirrors the host's "single last fatal error" slot: at most one fatal
/// error survives to shutdown, and clearing it stops the platform's own
/// shutdown reporting from duplicating what this facility already logged.
pub trait HostHooks: Send + Sync {
    fn last_fatal_error(&self) -> Option<PlatformError>;
    fn clear_last_fatal_error(&self);
}

/// In-memory [`ExpiringCache`] with real TTL expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExpiringCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        if let Some((value, expires)) = entries.get(key) {
            if *expires > Instant::now() {
                return Some(value.clone());
            }
        } else {
            return None;
        }
        // Present but past its TTL.
        entries.remove(key);
        None
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

/// In-memory [`SettingsStore`].
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, name: &str) -> Option<String> {
        self.values.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.values.lock().insert(name.to_string(), value.to_string());
    }

    fn delete(&self, name: &str) {
        self.values.lock().remove(name);
    }
}

/// In-memory [`HostHooks`] holding the single last-fatal-error slot.
#[derive(Default)]
pub struct MemoryHooks {
    fatal: Mutex<Option<PlatformError>>,
}

impl MemoryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the platform recording a fatal error before shutdown.
    pub fn record_fatal(&self, error: PlatformError) {
        *self.fatal.lock() = Some(error);
    }
}

impl HostHooks for MemoryHooks {
    fn last_fatal_error(&self) -> Option<PlatformError> {
        self.fatal.lock().clone()
    }

    fn clear_last_fatal_error(&self) {
        *self.fatal.lock() = None;
    }
}
