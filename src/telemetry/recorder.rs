//! # Metrics Recorder
//!
//! Thread-safe counters for the resolution path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated on every resolution.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    resolutions: AtomicU64,
    fired: AtomicU64,
    no_match: AtomicU64,
    skipped_messages: AtomicU64,
    cooldown_blocked: AtomicU64,
    store_errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    snapshots_discarded: AtomicU64,
    invalid_patterns: AtomicU64,
    invalidations: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl MetricsRecorder {
            $(
                #[inline]
                pub fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_resolution => resolutions,
    record_fired => fired,
    record_no_match => no_match,
    record_skipped_message => skipped_messages,
    record_cooldown_blocked => cooldown_blocked,
    record_store_error => store_errors,
    record_cache_hit => cache_hits,
    record_cache_miss => cache_misses,
    record_snapshot_discarded => snapshots_discarded,
    record_invalidation => invalidations,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invalid_patterns(&self, count: u64) {
        if count > 0 {
            self.invalid_patterns.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            resolutions: load(&self.resolutions),
            fired: load(&self.fired),
            no_match: load(&self.no_match),
            skipped_messages: load(&self.skipped_messages),
            cooldown_blocked: load(&self.cooldown_blocked),
            store_errors: load(&self.store_errors),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            snapshots_discarded: load(&self.snapshots_discarded),
            invalid_patterns: load(&self.invalid_patterns),
            invalidations: load(&self.invalidations),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub resolutions: u64,
    pub fired: u64,
    pub no_match: u64,
    pub skipped_messages: u64,
    pub cooldown_blocked: u64,
    pub store_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub snapshots_discarded: u64,
    pub invalid_patterns: u64,
    pub invalidations: u64,
}

impl MetricsSnapshot {
    pub fn fire_rate(&self) -> f64 {
        if self.resolutions == 0 {
            0.0
        } else {
            self.fired as f64 / self.resolutions as f64
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
