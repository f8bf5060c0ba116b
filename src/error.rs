//! Error taxonomy for rule resolution.
//!
//! Infrastructure failures (`StoreUnavailable`) surface to the caller and are
//! retryable. Per-rule content defects (`RulePatternInvalid`) are isolated to
//! the offending rule and only ever logged by the engine.

use crate::types::{GroupId, RuleId};
use thiserror::Error;

/// Failure reported by a [`RuleStore`](crate::storage::RuleStore) adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Transport or storage backend could not serve the request
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by the engine and its components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rules for a group could not be fetched; no stale data was served
    #[error("rules for group {group_id} unavailable: {source}")]
    StoreUnavailable {
        group_id: GroupId,
        #[source]
        source: StoreError,
    },

    /// A single rule's pattern cannot be compiled or evaluated
    #[error("rule {rule_id} has an invalid pattern: {reason}")]
    RulePatternInvalid { rule_id: RuleId, reason: String },

    /// Configuration value out of range or unparsable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
