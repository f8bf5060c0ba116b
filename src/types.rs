//! Core rule types shared across the cache, matcher and engine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Chat group identifier (partition key for rules, cache entries and cooldowns).
pub type GroupId = i64;

/// Rule identifier, globally unique and stable across edits.
pub type RuleId = i64;

/// Returns the current wall-clock time in milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ================================================================================================
// MATCH MODE
// ================================================================================================

/// Algorithm used to test a message against a rule's pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Full-string equality (after trimming surrounding whitespace)
    Exact,
    /// Pattern is a substring of the message
    Contains,
    /// Pattern is a regular expression searched anywhere in the message
    Regex,
    /// Approximate similarity above the configured threshold
    Fuzzy,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Contains => "contains",
            MatchMode::Regex => "regex",
            MatchMode::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ================================================================================================
// RULE
// ================================================================================================

fn default_priority() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

/// A keyword auto-reply rule as returned by the rule store.
///
/// Rules are immutable snapshots during matching; edits produce a new
/// snapshot on the next cache refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub group_id: GroupId,
    pub mode: MatchMode,
    pub pattern: String,
    pub reply: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower fires first
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Per-rule throttle override; `None` falls back to the configured default
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    /// Seconds after which the transport should delete the bot's reply
    #[serde(default)]
    pub delete_after_secs: Option<u64>,
}

impl Rule {
    /// Creates an enabled rule with default priority and no overrides.
    pub fn new(
        id: RuleId,
        group_id: GroupId,
        mode: MatchMode,
        pattern: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self {
            id,
            group_id,
            mode,
            pattern: pattern.into(),
            reply: reply.into(),
            enabled: true,
            priority: default_priority(),
            cooldown_secs: None,
            delete_after_secs: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    pub fn with_delete_after(mut self, secs: u64) -> Self {
        self.delete_after_secs = Some(secs);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Resolution order: enabled first, then ascending priority, then ascending id.
///
/// Ids are unique, so this is a total order and first-match selection is
/// deterministic no matter what order the store returned.
pub fn rule_order(a: &Rule, b: &Rule) -> Ordering {
    b.enabled
        .cmp(&a.enabled)
        .then(a.priority.cmp(&b.priority))
        .then(a.id.cmp(&b.id))
}

/// Sorts a rule set in place by [`rule_order`].
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(rule_order);
}

// ================================================================================================
// MATCH RESULT
// ================================================================================================

/// Outcome of resolving one inbound message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub fired: bool,
    pub reply_text: Option<String>,
    pub rule_id: Option<RuleId>,
    pub delete_after_secs: Option<u64>,
}

impl MatchResult {
    /// The "no rule fired" outcome.
    pub fn no_match() -> Self {
        Self::default()
    }

    pub fn fired(rule: &Rule) -> Self {
        Self {
            fired: true,
            reply_text: Some(rule.reply.clone()),
            rule_id: Some(rule.id),
            delete_after_secs: rule.delete_after_secs,
        }
    }
}
