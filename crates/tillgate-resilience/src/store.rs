//! State store abstraction for shared breaker state.
//!
//! Breaker records are shared mutable state: multiple workers may read and
//! mutate the same (tenant, service) row concurrently. The store exposes a
//! versioned compare-and-swap interface so state transitions are atomic;
//! the in-memory implementation backs tests and the diagnostic CLI, while a
//! production deployment would put a database or cache behind the same
//! trait.

use std::collections::HashMap;

use tillgate_core::models::{BreakerKey, BreakerState};
use tokio::sync::Mutex;

/// A breaker state together with the store version it was read at.
///
/// The version is an opaque monotonic counter per key; a compare-and-swap
/// only succeeds when the stored version still matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Store version the value was read at.
    pub version: u64,
    /// The stored value.
    pub value: T,
}

/// Storage operations required by the circuit breaker.
#[async_trait::async_trait]
pub trait BreakerStore: Send + Sync + std::fmt::Debug {
    /// Loads the state for a key, if one exists.
    async fn load(&self, key: &BreakerKey) -> Option<Versioned<BreakerState>>;

    /// Loads the state for a key, inserting `default` if absent.
    async fn load_or_insert(
        &self,
        key: &BreakerKey,
        default: BreakerState,
    ) -> Versioned<BreakerState>;

    /// Replaces the state for a key if the stored version still matches.
    ///
    /// Returns false when another writer got there first; the caller should
    /// re-read and recompute its transition.
    async fn compare_and_swap(
        &self,
        key: &BreakerKey,
        expected_version: u64,
        next: BreakerState,
    ) -> bool;

    /// Returns all keys with stored state.
    async fn keys(&self) -> Vec<BreakerKey>;
}

/// In-memory breaker store.
#[derive(Debug, Default)]
pub struct MemoryBreakerStore {
    entries: Mutex<HashMap<BreakerKey, (u64, BreakerState)>>,
}

impl MemoryBreakerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BreakerStore for MemoryBreakerStore {
    async fn load(&self, key: &BreakerKey) -> Option<Versioned<BreakerState>> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .map(|(version, state)| Versioned { version: *version, value: state.clone() })
    }

    async fn load_or_insert(
        &self,
        key: &BreakerKey,
        default: BreakerState,
    ) -> Versioned<BreakerState> {
        let mut entries = self.entries.lock().await;
        let (version, state) = entries.entry(key.clone()).or_insert((0, default));
        Versioned { version: *version, value: state.clone() }
    }

    async fn compare_and_swap(
        &self,
        key: &BreakerKey,
        expected_version: u64,
        next: BreakerState,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some((version, state)) if *version == expected_version => {
                *version += 1;
                *state = next;
                true
            },
            _ => false,
        }
    }

    async fn keys(&self) -> Vec<BreakerKey> {
        self.entries.lock().await.keys().cloned().collect()
    }
}
