//! Admission screening for submitted tasks.
//!
//! The validator runs an ordered chain of independent rules against a task.
//! Every rule is evaluated so the report lists all violations for the audit
//! trail; the first violation is the reason recorded on the rejected task.
//!
//! Rules are a closed set ([`SafetyRule`]). Adding a rule means adding a
//! variant and its `evaluate` arm.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::SafetyConfig;
use crate::types::Task;

/// Constraint key holding a declared safety level.
pub const SAFETY_LEVEL_KEY: &str = "safety_level";

/// Constraint key holding a declared token budget.
pub const MAX_TOKENS_KEY: &str = "max_tokens";

/// Metadata key marking consensus approval of a critical task.
pub const CONSENSUS_APPROVED_KEY: &str = "consensus_approved";

/// Metadata key naming the reviewer of a critical task.
pub const REVIEWED_BY_KEY: &str = "reviewed_by";

/// Errors building a validator.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    /// A configured prohibited pattern is not a valid regular expression.
    #[error("invalid prohibited pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Risk tier a task may declare in its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// Routine work.
    Low,
    /// Needs normal care.
    Medium,
    /// Risky but not gated.
    High,
    /// Requires consensus approval and a named reviewer.
    Critical,
}

impl FromStr for SafetyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown safety level: {other}")),
        }
    }
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the rule that rejected the task.
    pub rule: String,
    /// Human-readable reason.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Outcome of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The rule has no objection.
    Pass,
    /// The rule rejects the task with a reason.
    Reject(String),
}

/// Result of running every rule against a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` iff no rule rejected the task.
    pub approved: bool,
    /// Every triggered rule, in chain order.
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// The violation that stops admission (first in chain order).
    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations.first()
    }

    /// Violation messages only.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}

// ── Rules ───────────────────────────────────────────────────────

/// Rejects descriptions matching any configured pattern (case-insensitive).
#[derive(Debug, Clone)]
pub struct ProhibitedPatternRule {
    patterns: Vec<Regex>,
}

impl ProhibitedPatternRule {
    /// Compile `patterns` case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::InvalidPattern`] for the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, SafetyError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| SafetyError::InvalidPattern {
                        pattern: pattern.to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn evaluate(&self, task: &Task) -> RuleOutcome {
        match self
            .patterns
            .iter()
            .find(|pattern| pattern.is_match(&task.description))
        {
            Some(pattern) => RuleOutcome::Reject(format!(
                "task contains prohibited pattern: {}",
                pattern.as_str()
            )),
            None => RuleOutcome::Pass,
        }
    }
}

/// Caps the declared token budget and the requested timeout.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimitRule {
    /// Largest accepted `max_tokens` constraint.
    pub max_tokens: u64,
    /// Largest accepted timeout in seconds.
    pub max_timeout_seconds: u64,
}

impl ResourceLimitRule {
    fn evaluate(&self, task: &Task) -> RuleOutcome {
        if let Some(tokens) = task.constraints.get(MAX_TOKENS_KEY).and_then(token_count) {
            if tokens > self.max_tokens {
                return RuleOutcome::Reject(format!(
                    "task exceeds token limit ({tokens}>{})",
                    self.max_tokens
                ));
            }
        }
        if task.timeout_seconds > self.max_timeout_seconds {
            return RuleOutcome::Reject(format!(
                "task timeout {}s exceeds limit {}s",
                task.timeout_seconds, self.max_timeout_seconds
            ));
        }
        RuleOutcome::Pass
    }
}

/// `u64::MAX` as the nearest `f64`; anything at or above it saturates.
const U64_MAX_AS_F64: f64 = 18_446_744_073_709_551_615.0;

/// Declared token budget as an integer.
///
/// Fractional values round up and budgets beyond `u64` (including infinity
/// and NaN) saturate to `u64::MAX`. Non-positive or non-numeric values are
/// ignored.
fn token_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let n = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
    if n <= 0.0 {
        return None;
    }
    if !n.is_finite() || n >= U64_MAX_AS_F64 {
        return Some(u64::MAX);
    }
    format!("{:.0}", n.ceil()).parse().ok()
}

/// Gates `critical` tasks behind consensus approval and a named reviewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyLevelRule {
    /// Reject tasks declaring an unrecognised level instead of letting them through.
    pub reject_unknown: bool,
}

impl SafetyLevelRule {
    fn evaluate(&self, task: &Task) -> RuleOutcome {
        let Some(declared) = task.constraints.get(SAFETY_LEVEL_KEY) else {
            return RuleOutcome::Pass;
        };
        let raw = match declared {
            Value::Null => return RuleOutcome::Pass,
            Value::String(s) if s.is_empty() => return RuleOutcome::Pass,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let level = match raw.parse::<SafetyLevel>() {
            Ok(level) => level,
            Err(_) if self.reject_unknown => {
                return RuleOutcome::Reject(format!("unknown safety level: {raw}"));
            }
            Err(_) => {
                // Unknown levels are admitted unless fail-closed is configured.
                debug!(task_id = %task.id, level = %raw, "unknown safety level admitted");
                return RuleOutcome::Pass;
            }
        };

        if level != SafetyLevel::Critical {
            return RuleOutcome::Pass;
        }

        let approved = task
            .metadata
            .get(CONSENSUS_APPROVED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let reviewed = task
            .metadata
            .get(REVIEWED_BY_KEY)
            .and_then(Value::as_str)
            .is_some_and(|reviewer| !reviewer.trim().is_empty());

        if approved && reviewed {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Reject("critical tasks require consensus approval".to_owned())
        }
    }
}

/// The closed set of admission rules.
#[derive(Debug, Clone)]
pub enum SafetyRule {
    /// See [`ProhibitedPatternRule`].
    ProhibitedPattern(ProhibitedPatternRule),
    /// See [`ResourceLimitRule`].
    ResourceLimit(ResourceLimitRule),
    /// See [`SafetyLevelRule`].
    SafetyLevel(SafetyLevelRule),
}

impl SafetyRule {
    /// Stable rule name used in violations and audit details.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProhibitedPattern(_) => "prohibited_pattern",
            Self::ResourceLimit(_) => "resource_limit",
            Self::SafetyLevel(_) => "safety_level",
        }
    }

    /// Evaluate this rule against `task`.
    pub fn evaluate(&self, task: &Task) -> RuleOutcome {
        match self {
            Self::ProhibitedPattern(rule) => rule.evaluate(task),
            Self::ResourceLimit(rule) => rule.evaluate(task),
            Self::SafetyLevel(rule) => rule.evaluate(task),
        }
    }
}

// ── Validator ───────────────────────────────────────────────────

/// Ordered chain of [`SafetyRule`]s.
#[derive(Debug, Clone, Default)]
pub struct SafetyValidator {
    rules: Vec<SafetyRule>,
}

impl SafetyValidator {
    /// Validator with an explicit rule chain.
    pub fn new(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    /// The standard chain: prohibited patterns, resource limits, safety level.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::InvalidPattern`] if a configured pattern does not compile.
    pub fn from_config(config: &SafetyConfig) -> Result<Self, SafetyError> {
        Ok(Self::new(vec![
            SafetyRule::ProhibitedPattern(ProhibitedPatternRule::new(
                &config.prohibited_patterns,
            )?),
            SafetyRule::ResourceLimit(ResourceLimitRule {
                max_tokens: config.max_tokens,
                max_timeout_seconds: config.max_timeout_seconds,
            }),
            SafetyRule::SafetyLevel(SafetyLevelRule {
                reject_unknown: config.reject_unknown_safety_levels,
            }),
        ]))
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// Run every rule and collect all violations.
    pub fn validate(&self, task: &Task) -> ValidationReport {
        let violations: Vec<Violation> = self
            .rules
            .iter()
            .filter_map(|rule| match rule.evaluate(task) {
                RuleOutcome::Pass => None,
                RuleOutcome::Reject(message) => Some(Violation {
                    rule: rule.name().to_owned(),
                    message,
                }),
            })
            .collect();

        ValidationReport {
            approved: violations.is_empty(),
            violations,
        }
    }
}
