//! Rule resolution engine.
//!
//! The Engine is the entry point used by the message-handling layer. It
//! composes the per-group [`RuleCache`] with the [`CooldownTracker`] and
//! decides, for each inbound group message, which rule (if any) fires.
//!
//! # Resolution
//! 1. Fetch the group's ordered snapshot through the cache
//! 2. Scan enabled rules in `(priority, id)` order
//! 3. The first rule that matches *and* clears its cooldown fires
//! 4. A matching rule that is still cooling down is skipped and the scan
//!    continues with lower-priority rules
//!
//! Cooldown state is recorded only once a rule has definitively fired and
//! nothing is awaited afterwards, so an abandoned `resolve` future never
//! leaves a partial update behind.

use crate::cache::{CacheStats, RuleCache};
use crate::config::EngineConfig;
use crate::cooldown::CooldownTracker;
use crate::error::EngineResult;
use crate::matcher::PreparedMessage;
use crate::storage::{RuleChange, RuleStore};
use crate::telemetry::{MetricsRecorder, MetricsSnapshot};
use crate::types::{now_ms, GroupId, MatchResult};
use log::debug;
use std::sync::Arc;

// ================================================================================================
// ENGINE
// ================================================================================================

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    cache: RuleCache,
    cooldowns: CooldownTracker,
    metrics: Arc<MetricsRecorder>,
    created_at: u64,
}

impl Engine {
    /// Creates an engine reading rules from `store`.
    pub fn new(store: Arc<dyn RuleStore>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsRecorder::new());
        let cache = RuleCache::new(store, config.clone(), Arc::clone(&metrics));

        Ok(Self {
            config,
            cache,
            cooldowns: CooldownTracker::new(),
            metrics,
            created_at: now_ms(),
        })
    }

    /// Creates an engine with [`EngineConfig::default`].
    pub fn with_defaults(store: Arc<dyn RuleStore>) -> EngineResult<Self> {
        Self::new(store, EngineConfig::default())
    }

    // ============================================================================================
    // ACCESSORS
    // ============================================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    // ============================================================================================
    // RESOLUTION
    // ============================================================================================

    /// Decides which rule, if any, replies to `text` in `group_id` at time `now` (ms).
    ///
    /// Returns `Err(StoreUnavailable)` when the group's rules cannot be loaded;
    /// the caller should send nothing for that message. A message no rule
    /// fires for is `Ok` with `fired == false`.
    pub async fn resolve(
        &self,
        group_id: GroupId,
        text: &str,
        now: u64,
    ) -> EngineResult<MatchResult> {
        self.metrics.record_resolution();

        if self.should_skip(text) {
            self.metrics.record_skipped_message();
            return Ok(MatchResult::no_match());
        }

        let snapshot = self.cache.get_at(group_id, now).await?;
        let message = PreparedMessage::new(text, !self.config.case_sensitive);

        for compiled in snapshot.rules() {
            if !compiled.rule.enabled {
                // Disabled rules sort last
                break;
            }
            let Some(matcher) = compiled.matcher.as_ref() else {
                continue;
            };
            if !matcher.is_match(&message) {
                continue;
            }

            if self
                .cooldowns
                .try_fire(group_id, compiled.rule.id, compiled.cooldown_ms, now)
            {
                self.metrics.record_fired();
                debug!("Rule {} fired in group {}", compiled.rule.id, group_id);
                return Ok(MatchResult::fired(&compiled.rule));
            }

            self.metrics.record_cooldown_blocked();
            debug!(
                "Rule {} matched in group {} but is cooling down",
                compiled.rule.id, group_id
            );
        }

        self.metrics.record_no_match();
        Ok(MatchResult::no_match())
    }

    /// [`resolve`](Self::resolve) at the current wall-clock time.
    pub async fn resolve_now(&self, group_id: GroupId, text: &str) -> EngineResult<MatchResult> {
        self.resolve(group_id, text, now_ms()).await
    }

    fn should_skip(&self, text: &str) -> bool {
        text.trim().is_empty() || (self.config.skip_commands && text.starts_with('/'))
    }

    // ============================================================================================
    // WRITE-SIDE NOTIFICATIONS
    // ============================================================================================

    /// Forces the next resolution for `group_id` to re-fetch its rules.
    pub fn invalidate_rules(&self, group_id: GroupId) {
        self.cache.invalidate(group_id);
    }

    /// Applies a rule write: invalidates the group and, for removed or
    /// disabled rules, forgets the rule's cooldown. Returns whether a
    /// cooldown entry was purged.
    pub fn apply_change(&self, change: &RuleChange) -> bool {
        self.invalidate_rules(change.group_id());
        if change.retires_rule() {
            self.cooldowns
                .purge_rule(change.group_id(), change.rule_id())
        } else {
            false
        }
    }

    // ============================================================================================
    // STATISTICS
    // ============================================================================================

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            metrics: self.metrics.snapshot(),
            cache: self.cache.stats(),
            cooldown_entries: self.cooldowns.len(),
            created_at: self.created_at,
        }
    }
}

/// Engine-level statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
    /// Tracked (group, rule) cooldown entries
    pub cooldown_entries: usize,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRuleStore;
    use crate::types::{MatchMode, Rule};

    fn engine_with(rules: Vec<Rule>) -> (Arc<MemoryRuleStore>, Engine) {
        let store = Arc::new(MemoryRuleStore::with_rules(rules));
        let engine = Engine::with_defaults(store.clone()).unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn test_skips_empty_and_commands_without_fetching() {
        let (store, engine) = engine_with(vec![Rule::new(1, 1, MatchMode::Contains, "/", "x")]);

        assert!(!engine.resolve(1, "   ", 0).await.unwrap().fired);
        assert!(!engine.resolve(1, "/rule", 0).await.unwrap().fired);
        assert_eq!(store.fetch_count(), 0);
        assert_eq!(engine.stats().metrics.skipped_messages, 2);
    }

    #[tokio::test]
    async fn test_commands_match_when_not_skipped() {
        let store = Arc::new(MemoryRuleStore::with_rules(vec![Rule::new(
            1,
            1,
            MatchMode::Exact,
            "/help",
            "see pinned",
        )]));
        let config = EngineConfig {
            skip_commands: false,
            ..EngineConfig::default()
        };
        let engine = Engine::new(store, config).unwrap();
        assert!(engine.resolve(1, "/help", 0).await.unwrap().fired);
    }

    #[tokio::test]
    async fn test_disabled_rules_never_fire() {
        let (_, engine) = engine_with(vec![
            Rule::new(1, 1, MatchMode::Contains, "hi", "disabled").disabled(),
        ]);
        let result = engine.resolve(1, "hi", 0).await.unwrap();
        assert_eq!(result, MatchResult::no_match());
    }

    #[tokio::test]
    async fn test_apply_change_purges_retired_cooldown() {
        let (store, engine) = engine_with(vec![
            Rule::new(1, 1, MatchMode::Contains, "hi", "one").with_cooldown(60),
        ]);
        assert!(engine.resolve(1, "hi", 0).await.unwrap().fired);
        assert!(engine.cooldowns().last_fired(1, 1).is_some());

        let change = store.set_enabled(1, 1, false).unwrap();
        assert!(engine.apply_change(&change));
        assert!(engine.cooldowns().last_fired(1, 1).is_none());
        assert!(!engine.resolve(1, "hi", 1).await.unwrap().fired);

        let change = store.set_enabled(1, 1, true).unwrap();
        assert!(!engine.apply_change(&change));
        assert!(engine.resolve(1, "hi", 2).await.unwrap().fired);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryRuleStore::new());
        let config = EngineConfig {
            fuzzy_threshold: 2.0,
            ..EngineConfig::default()
        };
        assert!(Engine::new(store, config).is_err());
    }
}
