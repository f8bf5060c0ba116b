//! TTL-bound, per-group cache of compiled rule sets.
//!
//! Each group owns a slot holding an immutable [`RuleSnapshot`] behind an
//! `Arc`. Snapshots are replaced wholesale and never mutated, so readers
//! never observe a half-updated rule list.
//!
//! # Consistency
//! - A live entry (age < TTL) is served without touching the store.
//! - Misses are single-flight per group: concurrent callers wait on the
//!   group's fetch lock and then reuse whatever the first caller installed.
//! - Every slot carries a generation counter bumped by `invalidate`. A fetched
//!   snapshot is installed only if the generation is unchanged since the fetch
//!   started, so an invalidation racing a fetch never leaves stale rules behind.
//! - Store failures propagate; an expired entry is dropped rather than served.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::matcher::CompiledMatcher;
use crate::storage::RuleStore;
use crate::telemetry::MetricsRecorder;
use crate::types::{now_ms, sort_rules, GroupId, Rule};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ================================================================================================
// SNAPSHOT
// ================================================================================================

/// A rule with its pattern compiled and its effective cooldown resolved.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// `None` when the pattern failed to compile; the rule never fires
    pub matcher: Option<CompiledMatcher>,
    pub cooldown_ms: u64,
}

impl CompiledRule {
    pub fn compile(rule: Rule, config: &EngineConfig) -> Self {
        let matcher = match CompiledMatcher::compile(&rule, config) {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!("Skipping rule in group {}: {}", rule.group_id, e);
                None
            }
        };
        let mut cooldown_secs = rule.cooldown_secs.unwrap_or(config.default_cooldown_secs);
        if cooldown_secs > config.max_cooldown_secs {
            warn!(
                "Rule {} in group {}: cooldown {}s clamped to {}s",
                rule.id, rule.group_id, cooldown_secs, config.max_cooldown_secs
            );
            cooldown_secs = config.max_cooldown_secs;
        }

        Self {
            rule,
            matcher,
            cooldown_ms: cooldown_secs.saturating_mul(1000),
        }
    }
}

/// Immutable, ordered, compiled rule set for one group.
#[derive(Debug)]
pub struct RuleSnapshot {
    group_id: GroupId,
    rules: Vec<CompiledRule>,
    fetched_at: u64,
    generation: u64,
}

impl RuleSnapshot {
    /// Orders the rules by resolution priority and compiles every pattern.
    pub fn build(
        group_id: GroupId,
        mut rules: Vec<Rule>,
        config: &EngineConfig,
        fetched_at: u64,
        generation: u64,
    ) -> Self {
        // Re-sort even though the store promises order; resolution order must
        // not depend on the storage layer.
        sort_rules(&mut rules);
        let rules = rules
            .into_iter()
            .map(|rule| CompiledRule::compile(rule, config))
            .collect();

        Self {
            group_id,
            rules,
            fetched_at,
            generation,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fetched_at(&self) -> u64 {
        self.fetched_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of rules whose pattern failed to compile.
    pub fn invalid_count(&self) -> usize {
        self.rules.iter().filter(|r| r.matcher.is_none()).count()
    }

    fn is_fresh(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.fetched_at) < ttl_ms
    }
}

// ================================================================================================
// GROUP SLOT
// ================================================================================================

#[derive(Debug, Default)]
struct GroupSlot {
    entry: RwLock<Option<Arc<RuleSnapshot>>>,
    generation: AtomicU64,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl GroupSlot {
    fn fresh(&self, now: u64, ttl_ms: u64) -> Option<Arc<RuleSnapshot>> {
        self.entry
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.is_fresh(now, ttl_ms))
            .map(Arc::clone)
    }

    fn invalidate(&self) {
        let mut entry = self.entry.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        *entry = None;
    }
}

// ================================================================================================
// RULE CACHE
// ================================================================================================

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Groups with a slot (cached or recently looked up)
    pub groups: usize,
    /// Slots currently holding a snapshot (fresh or expired)
    pub entries: usize,
    /// Total rules across held snapshots
    pub cached_rules: usize,
}

/// Per-group rule cache in front of a [`RuleStore`].
pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    config: EngineConfig,
    ttl_ms: u64,
    /// Slot map; write-locked only to create or evict a slot
    slots: RwLock<HashMap<GroupId, Arc<GroupSlot>>>,
    metrics: Arc<MetricsRecorder>,
}

impl std::fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCache")
            .field("ttl_ms", &self.ttl_ms)
            .field("groups", &self.slots.read().len())
            .finish()
    }
}

impl RuleCache {
    pub fn new(
        store: Arc<dyn RuleStore>,
        config: EngineConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let ttl_ms = config.cache_ttl_secs.saturating_mul(1000);
        Self {
            store,
            config,
            ttl_ms,
            slots: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Returns the group's rule snapshot as of now.
    pub async fn get(&self, group_id: GroupId) -> EngineResult<Arc<RuleSnapshot>> {
        self.get_at(group_id, now_ms()).await
    }

    /// Returns the group's rule snapshot, treating `now` as the current time.
    pub async fn get_at(&self, group_id: GroupId, now: u64) -> EngineResult<Arc<RuleSnapshot>> {
        if self.ttl_ms == 0 {
            // Caching disabled: always fetch, never install
            self.metrics.record_cache_miss();
            return self.fetch(group_id, now, 0).await;
        }

        let slot = self.slot(group_id);
        if let Some(snapshot) = slot.fresh(now, self.ttl_ms) {
            self.metrics.record_cache_hit();
            return Ok(snapshot);
        }

        let _fetch_guard = slot.fetch_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(snapshot) = slot.fresh(now, self.ttl_ms) {
            self.metrics.record_cache_hit();
            return Ok(snapshot);
        }
        self.metrics.record_cache_miss();

        let generation = slot.generation.load(Ordering::SeqCst);
        let snapshot = match self.fetch(group_id, now, generation).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Fail closed: an expired entry must not outlive a failed refresh
                let mut entry = slot.entry.write();
                if slot.generation.load(Ordering::SeqCst) == generation {
                    *entry = None;
                }
                return Err(e);
            }
        };

        {
            let mut entry = slot.entry.write();
            if slot.generation.load(Ordering::SeqCst) == generation {
                *entry = Some(Arc::clone(&snapshot));
            } else {
                debug!(
                    "Discarding snapshot for group {}: invalidated during fetch",
                    group_id
                );
                self.metrics.record_snapshot_discarded();
            }
        }

        Ok(snapshot)
    }

    /// Drops the group's cached snapshot and fences off in-flight fetches.
    pub fn invalidate(&self, group_id: GroupId) {
        let slot = self.slots.read().get(&group_id).map(Arc::clone);
        if let Some(slot) = slot {
            slot.invalidate();
        }
        self.metrics.record_invalidation();
        debug!("Invalidated rule cache for group {}", group_id);
    }

    /// Currently held snapshot for a group, regardless of freshness.
    pub fn peek(&self, group_id: GroupId) -> Option<Arc<RuleSnapshot>> {
        let slot = self.slots.read().get(&group_id).map(Arc::clone)?;
        let entry = slot.entry.read();
        entry.as_ref().map(Arc::clone)
    }

    /// Removes slots whose snapshot is expired or absent and that no caller
    /// is currently using. Returns the number of slots removed.
    pub fn evict_expired(&self, now: u64) -> usize {
        let mut slots = self.slots.write();
        let before = slots.len();
        let ttl_ms = self.ttl_ms;

        slots.retain(|_, slot| {
            // The map lock is held, so nobody can pick this slot up concurrently
            let in_use = Arc::strong_count(slot) > 1;
            in_use || slot.fresh(now, ttl_ms).is_some()
        });

        before - slots.len()
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.read();
        let mut stats = CacheStats {
            groups: slots.len(),
            ..Default::default()
        };

        for slot in slots.values() {
            if let Some(snapshot) = slot.entry.read().as_ref() {
                stats.entries += 1;
                stats.cached_rules += snapshot.len();
            }
        }

        stats
    }

    fn slot(&self, group_id: GroupId) -> Arc<GroupSlot> {
        if let Some(slot) = self.slots.read().get(&group_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(group_id).or_default())
    }

    async fn fetch(
        &self,
        group_id: GroupId,
        now: u64,
        generation: u64,
    ) -> EngineResult<Arc<RuleSnapshot>> {
        let rules = self.store.fetch_rules(group_id).await.map_err(|source| {
            warn!("Rule fetch failed for group {}: {}", group_id, source);
            self.metrics.record_store_error();
            EngineError::StoreUnavailable { group_id, source }
        })?;

        let snapshot = RuleSnapshot::build(group_id, rules, &self.config, now, generation);
        self.metrics
            .record_invalid_patterns(snapshot.invalid_count() as u64);
        debug!(
            "Fetched {} rules for group {} (generation {})",
            snapshot.len(),
            group_id,
            generation
        );

        Ok(Arc::new(snapshot))
    }
}
