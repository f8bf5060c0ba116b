//! Event-driven rule invalidation service.
//!
//! The admin-edit layer reports every rule write as a [`RuleChange`], either
//! by calling [`InvalidationService::apply`] directly or by sending it over
//! the channel consumed by [`InvalidationService::run`].

use crate::engine::Engine;
use crate::storage::RuleChange;
use crate::types::{now_ms, GroupId};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of applying one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationStats {
    /// Group whose cached rules were dropped
    pub group_id: GroupId,
    /// Whether the changed rule's cooldown entry was purged
    pub cooldown_purged: bool,
    /// Timestamp of the invalidation
    pub timestamp: u64,
}

pub struct InvalidationService {
    engine: Arc<Engine>,
}

impl InvalidationService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Applies a rule change immediately.
    pub fn apply(&self, change: &RuleChange) -> InvalidationStats {
        let cooldown_purged = self.engine.apply_change(change);
        info!(
            "Rules changed in group {} (rule {}): cache invalidated{}",
            change.group_id(),
            change.rule_id(),
            if cooldown_purged { ", cooldown purged" } else { "" }
        );

        InvalidationStats {
            group_id: change.group_id(),
            cooldown_purged,
            timestamp: now_ms(),
        }
    }

    /// Creates a bounded channel for rule changes.
    pub fn channel(capacity: usize) -> (mpsc::Sender<RuleChange>, mpsc::Receiver<RuleChange>) {
        mpsc::channel(capacity)
    }

    /// Applies changes until every sender is dropped. Returns how many were applied.
    pub async fn run(self: Arc<Self>, mut changes: mpsc::Receiver<RuleChange>) -> u64 {
        let mut applied = 0;
        while let Some(change) = changes.recv().await {
            self.apply(&change);
            applied += 1;
        }
        info!("Invalidation channel closed after {} changes", applied);
        applied
    }
}
