//! Pattern matching for auto-reply rules.
//!
//! Each rule's pattern is compiled once per cache snapshot into a
//! [`CompiledMatcher`]. Matching a message is then a pure function of the
//! compiled state and the message text.
//!
//! Fuzzy matching uses a normalized Levenshtein similarity. When the message
//! is longer than the pattern, the score is the pattern's best approximate
//! occurrence anywhere in the message (partial ratio), found in a single
//! linear pass over the message.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{MatchMode, Rule};
use regex::{Regex, RegexBuilder};

/// Upper bound on compiled regex program size.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Tolerance for comparing similarity ratios against the threshold.
const SIMILARITY_EPSILON: f64 = 1e-9;

// ================================================================================================
// PREPARED MESSAGE
// ================================================================================================

/// Inbound message text, normalized once per resolution.
#[derive(Debug)]
pub struct PreparedMessage<'a> {
    raw: &'a str,
    folded: Option<String>,
}

impl<'a> PreparedMessage<'a> {
    /// `fold_case` lowercases the text for case-insensitive exact/contains/fuzzy rules.
    pub fn new(raw: &'a str, fold_case: bool) -> Self {
        Self {
            raw,
            folded: fold_case.then(|| raw.to_lowercase()),
        }
    }

    pub fn raw(&self) -> &str {
        self.raw
    }

    /// Text as seen by exact/contains/fuzzy rules.
    pub fn normalized(&self) -> &str {
        self.folded.as_deref().unwrap_or(self.raw)
    }
}

// ================================================================================================
// COMPILED MATCHER
// ================================================================================================

/// Compiled, ready-to-evaluate form of a rule's pattern.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Exact(String),
    Contains(String),
    Regex(Regex),
    Fuzzy { pattern: Vec<char>, threshold: f64 },
}

impl CompiledMatcher {
    /// Compiles a rule's pattern according to its mode.
    ///
    /// Empty patterns and malformed regexes yield `RulePatternInvalid`.
    pub fn compile(rule: &Rule, config: &EngineConfig) -> EngineResult<Self> {
        if rule.pattern.trim().is_empty() {
            return Err(EngineError::RulePatternInvalid {
                rule_id: rule.id,
                reason: "empty pattern".to_string(),
            });
        }

        let fold = |s: &str| {
            if config.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };

        let matcher = match rule.mode {
            MatchMode::Exact => CompiledMatcher::Exact(fold(rule.pattern.trim())),
            MatchMode::Contains => CompiledMatcher::Contains(fold(&rule.pattern)),
            MatchMode::Regex => {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(config.regex_case_insensitive)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| EngineError::RulePatternInvalid {
                        rule_id: rule.id,
                        reason: e.to_string(),
                    })?;
                CompiledMatcher::Regex(regex)
            }
            MatchMode::Fuzzy => CompiledMatcher::Fuzzy {
                pattern: fold(rule.pattern.trim()).chars().collect(),
                threshold: config.fuzzy_threshold,
            },
        };

        Ok(matcher)
    }

    /// Evaluates the matcher against a prepared message.
    pub fn is_match(&self, message: &PreparedMessage<'_>) -> bool {
        match self {
            CompiledMatcher::Exact(pattern) => message.normalized().trim() == pattern.as_str(),
            CompiledMatcher::Contains(pattern) => message.normalized().contains(pattern.as_str()),
            CompiledMatcher::Regex(regex) => regex.is_match(message.raw()),
            CompiledMatcher::Fuzzy { pattern, threshold } => {
                let text: Vec<char> = message.normalized().trim().chars().collect();
                partial_similarity(pattern, &text) + SIMILARITY_EPSILON >= *threshold
            }
        }
    }

    pub fn mode(&self) -> MatchMode {
        match self {
            CompiledMatcher::Exact(_) => MatchMode::Exact,
            CompiledMatcher::Contains(_) => MatchMode::Contains,
            CompiledMatcher::Regex(_) => MatchMode::Regex,
            CompiledMatcher::Fuzzy { .. } => MatchMode::Fuzzy,
        }
    }
}

// ================================================================================================
// SIMILARITY
// ================================================================================================

/// Levenshtein edit distance over characters (two-row DP).
#[inline]
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized similarity in [0, 1]: `1 - distance / max(len)`.
#[inline]
fn similarity(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Smallest edit distance between `pattern` and any substring of `text`.
///
/// Semi-global DP over pattern rows: row 0 is all zeros so a match may start
/// anywhere in the text, and the minimum of the last row lets it end
/// anywhere. O(m * n) time, O(n) space.
fn best_substring_distance(pattern: &[char], text: &[char]) -> usize {
    let mut prev = vec![0usize; text.len() + 1];
    let mut curr = vec![0usize; text.len() + 1];

    for (i, pc) in pattern.iter().enumerate() {
        curr[0] = i + 1;
        for (j, tc) in text.iter().enumerate() {
            let substitution = prev[j] + usize::from(pc != tc);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev.iter().copied().min().unwrap_or(pattern.len())
}

/// Best similarity between `pattern` and any substring of `text`:
/// `1 - distance / pattern_len`.
///
/// A text shorter than the pattern is compared whole, so short messages
/// cannot match by being a fragment of a long pattern.
pub fn partial_similarity(pattern: &[char], text: &[char]) -> f64 {
    if pattern.is_empty() || text.is_empty() {
        // Nothing to compare = fail-closed
        return 0.0;
    }
    if text.len() <= pattern.len() {
        return similarity(pattern, text);
    }

    let distance = best_substring_distance(pattern, text);
    1.0 - distance as f64 / pattern.len() as f64
}
