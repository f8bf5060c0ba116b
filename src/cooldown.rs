//! Per-(group, rule) firing throttle.
//!
//! State is partitioned by group: each group owns its own mutex-protected
//! map, so messages in unrelated groups never contend. The check-then-record
//! sequence in [`CooldownTracker::try_fire`] runs under that mutex, which
//! makes it atomic against other writers of the same key.
//!
//! Cooldown state is independent of the rule cache and survives
//! invalidation and refresh.

use crate::types::{GroupId, RuleId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CooldownEntry {
    last_fired_at: u64,
    cooldown_ms: u64,
}

type GroupCooldowns = Arc<Mutex<HashMap<RuleId, CooldownEntry>>>;

#[derive(Debug, Default)]
pub struct CooldownTracker {
    groups: RwLock<HashMap<GroupId, GroupCooldowns>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fire at `now` unless the rule fired less than `cooldown_ms` ago.
    ///
    /// Returns `true` if the rule may fire (and the fire was recorded).
    /// A `now` earlier than the last fire counts as zero elapsed time.
    pub fn try_fire(&self, group_id: GroupId, rule_id: RuleId, cooldown_ms: u64, now: u64) -> bool {
        let group = self.group(group_id);
        let mut entries = group.lock();

        if let Some(entry) = entries.get(&rule_id) {
            if now.saturating_sub(entry.last_fired_at) < cooldown_ms {
                return false;
            }
        }

        entries.insert(
            rule_id,
            CooldownEntry {
                last_fired_at: now,
                cooldown_ms,
            },
        );
        true
    }

    /// Whether the rule is still inside its cooldown window at `now`.
    pub fn is_cooling(&self, group_id: GroupId, rule_id: RuleId, cooldown_ms: u64, now: u64) -> bool {
        self.last_fired(group_id, rule_id)
            .map(|last| now.saturating_sub(last) < cooldown_ms)
            .unwrap_or(false)
    }

    pub fn last_fired(&self, group_id: GroupId, rule_id: RuleId) -> Option<u64> {
        let group = self.groups.read().get(&group_id).map(Arc::clone)?;
        let entries = group.lock();
        entries.get(&rule_id).map(|e| e.last_fired_at)
    }

    /// Forgets a rule's cooldown (used when the rule is removed or disabled).
    pub fn purge_rule(&self, group_id: GroupId, rule_id: RuleId) -> bool {
        let group = self.groups.read().get(&group_id).map(Arc::clone);
        match group {
            Some(group) => group.lock().remove(&rule_id).is_some(),
            None => false,
        }
    }

    /// Drops entries whose cooldown has elapsed and that are older than
    /// `retention_ms`. Empty groups nobody is using are removed too. Returns
    /// the number of entries dropped.
    ///
    /// The cooldown stored with an entry is the one in force when it fired; a
    /// later edit may lengthen it. `retention_ms` must therefore be at least
    /// the longest cooldown any rule can be given.
    pub fn purge_expired(&self, now: u64, retention_ms: u64) -> usize {
        let mut groups = self.groups.write();
        let mut purged = 0;

        groups.retain(|_, group| {
            let mut entries = group.lock();
            let before = entries.len();
            entries.retain(|_, e| {
                now.saturating_sub(e.last_fired_at) < e.cooldown_ms.max(retention_ms)
            });
            purged += before - entries.len();

            // Map lock is held: a strong count of 1 means no try_fire is in flight
            !entries.is_empty() || Arc::strong_count(group) > 1
        });

        purged
    }

    /// Total tracked (group, rule) entries.
    pub fn len(&self) -> usize {
        self.groups.read().values().map(|g| g.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn group(&self, group_id: GroupId) -> GroupCooldowns {
        if let Some(group) = self.groups.read().get(&group_id) {
            return Arc::clone(group);
        }
        let mut groups = self.groups.write();
        Arc::clone(groups.entry(group_id).or_default())
    }
}
