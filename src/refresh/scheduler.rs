//! Scheduled maintenance - background task bounding in-memory state.
//!
//! Rule cache slots and cooldown entries are created on demand and would
//! otherwise accumulate for every group ever seen. This task periodically:
//!
//! 1. Evicts cache slots whose snapshot has expired and that nobody is using
//! 2. Drops cooldown entries whose window has elapsed and that are older than
//!    the retention, which is never shorter than the longest cooldown a rule
//!    can have (`max_cooldown_secs`), so a rule edited to a longer cooldown
//!    after it fired still has its last fire on record
//!
//! Neither step changes resolution outcomes: an expired snapshot is refetched
//! on the next lookup anyway, and an elapsed cooldown no longer blocks.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::interval;

use crate::config::MaintenanceConfig;
use crate::engine::Engine;
use crate::types::now_ms;
use log::info;

/// Statistics from a maintenance cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceStats {
    /// Cache slots removed
    pub cache_slots_evicted: usize,
    /// Cooldown entries removed
    pub cooldowns_purged: usize,
    /// Duration of the cycle in milliseconds
    pub duration_ms: u64,
    /// Timestamp the cycle ran at
    pub timestamp: u64,
}

/// Periodic maintenance runner.
///
/// Runs as a background task spawned next to the message handler.
pub struct MaintenanceScheduler {
    engine: Arc<Engine>,
    config: MaintenanceConfig,
    /// Timestamp of the last completed cycle
    last_run_at: RwLock<u64>,
}

impl MaintenanceScheduler {
    pub fn new(engine: Arc<Engine>, config: MaintenanceConfig) -> Self {
        Self {
            engine,
            config,
            last_run_at: RwLock::new(now_ms()),
        }
    }

    /// Timestamp of the last completed cycle, or creation time if none ran yet.
    pub fn last_run(&self) -> u64 {
        *self.last_run_at.read()
    }

    /// Runs maintenance cycles forever at the configured interval.
    ///
    /// Returns immediately when disabled.
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use autoreply::{Engine, MaintenanceConfig, MaintenanceScheduler, MemoryRuleStore};
    /// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    /// let engine = Arc::new(Engine::with_defaults(Arc::new(MemoryRuleStore::new()))?);
    /// let scheduler = Arc::new(MaintenanceScheduler::new(engine, MaintenanceConfig::default()));
    /// tokio::spawn(scheduler.start());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduled maintenance is disabled, skipping");
            return;
        }

        info!(
            "Starting scheduled maintenance with {}-second interval",
            self.config.interval.as_secs()
        );

        let mut ticker = interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.run_once(now_ms());
        }
    }

    /// Executes one maintenance cycle as of `now`.
    pub fn run_once(&self, now: u64) -> MaintenanceStats {
        let start = now_ms();

        let cache_slots_evicted = self.engine.cache().evict_expired(now);
        let retention_ms = self.retention_ms();
        let cooldowns_purged = self.engine.cooldowns().purge_expired(now, retention_ms);

        let stats = MaintenanceStats {
            cache_slots_evicted,
            cooldowns_purged,
            duration_ms: now_ms().saturating_sub(start),
            timestamp: now,
        };

        info!(
            "Maintenance completed: {} cache slots evicted, {} cooldowns purged in {}ms",
            stats.cache_slots_evicted, stats.cooldowns_purged, stats.duration_ms
        );
        *self.last_run_at.write() = now;

        stats
    }

    /// Effective cooldown retention in milliseconds.
    pub fn retention_ms(&self) -> u64 {
        let configured =
            u64::try_from(self.config.cooldown_retention.as_millis()).unwrap_or(u64::MAX);
        let longest_cooldown = self.engine.config().max_cooldown_secs.saturating_mul(1000);
        configured.max(longest_cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::storage::MemoryRuleStore;
    use crate::types::{MatchMode, Rule};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_once_evicts_and_purges() {
        let store = Arc::new(MemoryRuleStore::with_rules(vec![
            Rule::new(1, 1, MatchMode::Contains, "hi", "a").with_cooldown(1),
            Rule::new(2, 2, MatchMode::Contains, "hi", "b").with_cooldown(1),
        ]));
        let config = EngineConfig {
            cache_ttl_secs: 10,
            max_cooldown_secs: 30,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(store, config).unwrap());

        engine.resolve(1, "hi", 0).await.unwrap();
        engine.resolve(2, "hi", 50_000).await.unwrap();

        let scheduler = MaintenanceScheduler::new(
            Arc::clone(&engine),
            MaintenanceConfig {
                interval: Duration::from_secs(60),
                enabled: true,
                cooldown_retention: Duration::from_secs(30),
            },
        );

        let stats = scheduler.run_once(55_000);
        assert_eq!(stats.cache_slots_evicted, 1);
        assert_eq!(stats.cooldowns_purged, 1);
        assert_eq!(scheduler.last_run(), 55_000);

        assert!(engine.cache().peek(1).is_none());
        assert!(engine.cache().peek(2).is_some());
        assert_eq!(engine.cooldowns().len(), 1);
    }

    #[tokio::test]
    async fn test_raised_cooldown_outlives_configured_retention() {
        let store = Arc::new(MemoryRuleStore::with_rules(vec![
            Rule::new(1, 1, MatchMode::Contains, "hi", "a").with_cooldown(10),
        ]));
        let config = EngineConfig {
            max_cooldown_secs: 3 * 60 * 60,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(store.clone(), config).unwrap());
        let scheduler = MaintenanceScheduler::new(
            Arc::clone(&engine),
            MaintenanceConfig {
                cooldown_retention: Duration::from_secs(60 * 60),
                ..MaintenanceConfig::default()
            },
        );
        assert_eq!(scheduler.retention_ms(), 3 * 60 * 60 * 1000);

        assert!(engine.resolve(1, "hi", 0).await.unwrap().fired);

        // Cooldown raised to 2h after the fire
        let change = store.edit(1, 1, |r| r.cooldown_secs = Some(2 * 60 * 60)).unwrap();
        engine.apply_change(&change);

        let ninety_minutes = 90 * 60 * 1000;
        assert_eq!(scheduler.run_once(ninety_minutes).cooldowns_purged, 0);
        assert!(!engine.resolve(1, "hi", ninety_minutes).await.unwrap().fired);
        assert!(engine.resolve(1, "hi", 2 * 60 * 60 * 1000).await.unwrap().fired);
    }

    #[tokio::test]
    async fn test_disabled_start_returns() {
        let engine = Arc::new(Engine::with_defaults(Arc::new(MemoryRuleStore::new())).unwrap());
        let scheduler = Arc::new(MaintenanceScheduler::new(
            engine,
            MaintenanceConfig {
                enabled: false,
                ..MaintenanceConfig::default()
            },
        ));
        scheduler.start().await;
    }
}
