//! # Keyword Auto-Reply Engine
//!
//! Decides, for every inbound group message, which administrator-defined
//! keyword rule (if any) replies to it.
//!
//! ```text
//! message ──► Engine::resolve ──► RuleCache (TTL, per group) ──► RuleStore
//!                   │
//!                   └──► matcher (exact / contains / regex / fuzzy)
//!                   └──► CooldownTracker (per group, per rule)
//! ```
//!
//! Admin writes are reported through [`Engine::apply_change`] /
//! [`Engine::invalidate_rules`] so edits become visible on the next message
//! instead of after the cache TTL.

pub mod cache;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod refresh;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use cache::{CacheStats, CompiledRule, RuleCache, RuleSnapshot};
pub use config::{EngineConfig, MaintenanceConfig};
pub use cooldown::CooldownTracker;
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, EngineResult, StoreError};
pub use matcher::{CompiledMatcher, PreparedMessage};
pub use refresh::{InvalidationService, MaintenanceScheduler};
pub use storage::{MemoryRuleStore, RuleChange, RuleStore};
pub use telemetry::{MetricsRecorder, MetricsSnapshot};
pub use types::{now_ms, rule_order, GroupId, MatchMode, MatchResult, Rule, RuleId};
