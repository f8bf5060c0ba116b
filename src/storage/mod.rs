//! Rule store contract and write-side change events.
//!
//! The engine only reads through [`RuleStore::fetch_rules`]. Writes happen
//! elsewhere and are announced with [`RuleChange`] so cached rule sets can be
//! invalidated.

pub mod memory;

pub use memory::MemoryRuleStore;

use crate::error::StoreError;
use crate::types::{GroupId, Rule, RuleId};
use async_trait::async_trait;

/// Read side of persistent rule storage.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Returns every rule of a group (enabled or not), ordered by
    /// [`rule_order`](crate::types::rule_order).
    ///
    /// Must be side-effect free. An empty vector means the group has no
    /// rules; transient failures must be reported as `StoreError`.
    async fn fetch_rules(&self, group_id: GroupId) -> Result<Vec<Rule>, StoreError>;
}

/// A write that affected a group's rule set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleChange {
    Added { group_id: GroupId, rule_id: RuleId },
    Edited { group_id: GroupId, rule_id: RuleId },
    Removed { group_id: GroupId, rule_id: RuleId },
    Toggled {
        group_id: GroupId,
        rule_id: RuleId,
        enabled: bool,
    },
}

impl RuleChange {
    pub fn group_id(&self) -> GroupId {
        match self {
            RuleChange::Added { group_id, .. }
            | RuleChange::Edited { group_id, .. }
            | RuleChange::Removed { group_id, .. }
            | RuleChange::Toggled { group_id, .. } => *group_id,
        }
    }

    pub fn rule_id(&self) -> RuleId {
        match self {
            RuleChange::Added { rule_id, .. }
            | RuleChange::Edited { rule_id, .. }
            | RuleChange::Removed { rule_id, .. }
            | RuleChange::Toggled { rule_id, .. } => *rule_id,
        }
    }

    /// Whether the rule can no longer fire, so its cooldown entry is dead weight.
    pub fn retires_rule(&self) -> bool {
        matches!(
            self,
            RuleChange::Removed { .. } | RuleChange::Toggled { enabled: false, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_change_accessors() {
        let change = RuleChange::Toggled {
            group_id: -5,
            rule_id: 12,
            enabled: false,
        };
        assert_eq!(change.group_id(), -5);
        assert_eq!(change.rule_id(), 12);
        assert!(change.retires_rule());
    }

    #[test]
    fn test_only_removal_and_disable_retire() {
        assert!(RuleChange::Removed { group_id: 1, rule_id: 1 }.retires_rule());
        assert!(!RuleChange::Added { group_id: 1, rule_id: 1 }.retires_rule());
        assert!(!RuleChange::Edited { group_id: 1, rule_id: 1 }.retires_rule());
        assert!(!RuleChange::Toggled {
            group_id: 1,
            rule_id: 1,
            enabled: true
        }
        .retires_rule());
    }
}
