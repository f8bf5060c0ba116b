//! In-memory rule store.
//!
//! Reference [`RuleStore`] adapter used by the demo binary, benches and
//! tests. Write methods return the [`RuleChange`] the caller must forward to
//! the engine. Supports fault injection (`set_unavailable`) and an artificial
//! fetch latency for exercising races.

use super::{RuleChange, RuleStore};
use crate::error::{EngineError, EngineResult, StoreError};
use crate::types::{sort_rules, GroupId, Rule, RuleId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    /// group_id -> rules (unordered; ordering is applied on fetch)
    rules: RwLock<HashMap<GroupId, Vec<Rule>>>,
    next_id: AtomicI64,
    fetch_count: AtomicU64,
    fetches_by_group: RwLock<HashMap<GroupId, u64>>,
    unavailable: AtomicBool,
    fetch_delay: RwLock<Option<Duration>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Creates a store pre-populated with rules.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let store = Self::new();
        for rule in rules {
            store.insert(rule);
        }
        store
    }

    /// Parses a JSON array of rules.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let rules: Vec<Rule> = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("Failed to parse rules: {}", e)))?;
        Ok(Self::with_rules(rules))
    }

    /// Allocates a fresh rule id.
    pub fn next_rule_id(&self) -> RuleId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // ============================================================================================
    // WRITES
    // ============================================================================================

    /// Inserts a rule (replacing any rule with the same id in the same group).
    pub fn insert(&self, rule: Rule) -> RuleChange {
        self.next_id.fetch_max(rule.id + 1, Ordering::SeqCst);

        let group_id = rule.group_id;
        let rule_id = rule.id;
        let mut rules = self.rules.write();
        let group = rules.entry(group_id).or_default();

        match group.iter_mut().find(|r| r.id == rule_id) {
            Some(existing) => {
                *existing = rule;
                RuleChange::Edited { group_id, rule_id }
            }
            None => {
                group.push(rule);
                RuleChange::Added { group_id, rule_id }
            }
        }
    }

    /// Removes a rule. Returns `None` if it did not exist.
    pub fn remove(&self, group_id: GroupId, rule_id: RuleId) -> Option<RuleChange> {
        let mut rules = self.rules.write();
        let group = rules.get_mut(&group_id)?;
        let before = group.len();
        group.retain(|r| r.id != rule_id);

        (group.len() < before).then_some(RuleChange::Removed { group_id, rule_id })
    }

    /// Enables or disables a rule. Returns `None` if it did not exist.
    pub fn set_enabled(
        &self,
        group_id: GroupId,
        rule_id: RuleId,
        enabled: bool,
    ) -> Option<RuleChange> {
        self.edit(group_id, rule_id, |rule| rule.enabled = enabled)?;
        Some(RuleChange::Toggled {
            group_id,
            rule_id,
            enabled,
        })
    }

    /// Applies an in-place edit to a rule. Returns `None` if it did not exist.
    pub fn edit<F>(&self, group_id: GroupId, rule_id: RuleId, f: F) -> Option<RuleChange>
    where
        F: FnOnce(&mut Rule),
    {
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(&group_id)?
            .iter_mut()
            .find(|r| r.id == rule_id)?;
        f(rule);
        Some(RuleChange::Edited { group_id, rule_id })
    }

    // ============================================================================================
    // FAULT INJECTION & INSPECTION
    // ============================================================================================

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.write() = delay;
    }

    /// Total number of `fetch_rules` calls (successful or not).
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn fetch_count_for(&self, group_id: GroupId) -> u64 {
        self.fetches_by_group
            .read()
            .get(&group_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().values().map(Vec::len).sum()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.rules.read().keys().copied().collect()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn fetch_rules(&self, group_id: GroupId) -> Result<Vec<Rule>, StoreError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        *self.fetches_by_group.write().entry(group_id).or_insert(0) += 1;

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "memory store offline (group {})",
                group_id
            )));
        }

        // Read first, then delay: models a response that is slow in transit
        // and may be outdated by the time it arrives.
        let mut rules = self
            .rules
            .read()
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        sort_rules(&mut rules);

        let delay = *self.fetch_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(rules)
    }
}
