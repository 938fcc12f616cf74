//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the definition -> validator -> document pipeline
///
/// All counters use Relaxed atomics; readers only need eventual values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Definitions fetched and parsed
    definitions_loaded: AtomicU64,
    /// Validators built (nested ones included)
    validators_compiled: AtomicU64,
    /// Validators served from a cache
    cache_hits: AtomicU64,
    /// Documents that passed validation
    documents_validated: AtomicU64,
    /// Documents that failed validation
    documents_rejected: AtomicU64,
    /// Keys removed because their value was blacklisted
    blacklisted_keys_removed: AtomicU64,
    /// Map entries removed because their id no longer exists
    dangling_entries_removed: AtomicU64,
    /// Calls made to the entity oracle
    oracle_queries: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Compile metrics

    pub fn increment_definitions_loaded(&self) {
        self.definitions_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validators_compiled(&self) {
        self.validators_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    // Validation metrics

    pub fn increment_documents_validated(&self) {
        self.documents_validated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_rejected(&self) {
        self.documents_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Cleanup metrics

    pub fn add_blacklisted_keys_removed(&self, count: u64) {
        self.blacklisted_keys_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dangling_entries_removed(&self, count: u64) {
        self.dangling_entries_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_oracle_queries(&self, count: u64) {
        self.oracle_queries.fetch_add(count, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"definitions_loaded":{},"validators_compiled":{},"cache_hits":{},"documents_validated":{},"documents_rejected":{},"blacklisted_keys_removed":{},"dangling_entries_removed":{},"oracle_queries":{}}}"#,
            s.definitions_loaded,
            s.validators_compiled,
            s.cache_hits,
            s.documents_validated,
            s.documents_rejected,
            s.blacklisted_keys_removed,
            s.dangling_entries_removed,
            s.oracle_queries,
        )
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            definitions_loaded: self.definitions_loaded.load(Ordering::Relaxed),
            validators_compiled: self.validators_compiled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            documents_validated: self.documents_validated.load(Ordering::Relaxed),
            documents_rejected: self.documents_rejected.load(Ordering::Relaxed),
            blacklisted_keys_removed: self.blacklisted_keys_removed.load(Ordering::Relaxed),
            dangling_entries_removed: self.dangling_entries_removed.load(Ordering::Relaxed),
            oracle_queries: self.oracle_queries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub definitions_loaded: u64,
    pub validators_compiled: u64,
    pub cache_hits: u64,
    pub documents_validated: u64,
    pub documents_rejected: u64,
    pub blacklisted_keys_removed: u64,
    pub dangling_entries_removed: u64,
    pub oracle_queries: u64,
}
