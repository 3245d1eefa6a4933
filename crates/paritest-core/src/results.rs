//! Result types: what one invocation did, and what grading concluded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::Feature;
use crate::value::{format_arguments, Thrown, Value};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TerminalStatus {
    Returned(Value),
    Threw(Thrown),
    TimedOut,
    Crashed(String),
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Returned(value) => write!(f, "{value}"),
            TerminalStatus::Threw(thrown) => write!(f, "threw {thrown}"),
            TerminalStatus::TimedOut => write!(f, "timed out"),
            TerminalStatus::Crashed(message) => write!(f, "crashed: {message}"),
        }
    }
}

/// Outcome of invoking one callable on one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionObservation {
    pub status: TerminalStatus,
    /// Printed lines, in order.
    #[serde(default)]
    pub output: Vec<String>,
    /// Lines dropped after the output limit was reached.
    #[serde(default)]
    pub truncated_lines: usize,
}

impl ExecutionObservation {
    pub fn new(status: TerminalStatus) -> Self {
        Self {
            status,
            output: Vec::new(),
            truncated_lines: 0,
        }
    }

    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.output = output;
        self
    }

    pub fn returned(&self) -> Option<&Value> {
        match &self.status {
            TerminalStatus::Returned(value) => Some(value),
            _ => None,
        }
    }
}

/// Why a verdict failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    ValueMismatch,
    OutputMismatch,
    ErrorKindMismatch,
    Timeout,
    Crash,
    MissingRequiredFeature,
    ForbiddenFeatureUsed,
    ParseFailure,
    ConstructionFailure,
    UnsupportedShape,
    TooComplex,
    TooLong,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Reason::ValueMismatch => "value mismatch",
            Reason::OutputMismatch => "output mismatch",
            Reason::ErrorKindMismatch => "error kind mismatch",
            Reason::Timeout => "timeout",
            Reason::Crash => "crash",
            Reason::MissingRequiredFeature => "missing required feature",
            Reason::ForbiddenFeatureUsed => "forbidden feature used",
            Reason::ParseFailure => "parse failure",
            Reason::ConstructionFailure => "construction failure",
            Reason::UnsupportedShape => "unsupported shape",
            Reason::TooComplex => "too complex",
            Reason::TooLong => "too long",
        };
        f.write_str(tag)
    }
}

/// The first test case on which a submission diverged from the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub reason: Reason,
    pub index: usize,
    /// Literal input values of the offending case.
    pub arguments: Vec<Value>,
    pub expected: String,
    pub found: String,
    #[serde(default)]
    pub expected_output: Vec<String>,
    #[serde(default)]
    pub found_output: Vec<String>,
}

impl fmt::Display for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on case {} {}: expected {}, found {}",
            self.reason,
            self.index,
            format_arguments(&self.arguments),
            self.expected,
            self.found
        )
    }
}

/// Dynamic half of a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceVerdict {
    pub cases_run: usize,
    #[serde(default)]
    pub failure: Option<CaseFailure>,
}

impl EquivalenceVerdict {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// A submission measure over the limit derived from the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excess {
    pub reference: u32,
    pub submission: u32,
    pub limit: u32,
}

/// Static half of a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVerdict {
    #[serde(default)]
    pub forbidden: Vec<Feature>,
    #[serde(default)]
    pub forbidden_calls: Vec<String>,
    #[serde(default)]
    pub missing: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Excess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lines: Option<Excess>,
}

impl FeatureVerdict {
    pub fn passed(&self) -> bool {
        self.reason().is_none()
    }

    pub fn reason(&self) -> Option<Reason> {
        if !self.forbidden.is_empty() || !self.forbidden_calls.is_empty() {
            Some(Reason::ForbiddenFeatureUsed)
        } else if !self.missing.is_empty() {
            Some(Reason::MissingRequiredFeature)
        } else if self.complexity.is_some() {
            Some(Reason::TooComplex)
        } else if self.source_lines.is_some() {
            Some(Reason::TooLong)
        } else {
            None
        }
    }

    /// Human-readable violations, forbidden constructs first.
    pub fn errors(&self) -> Vec<String> {
        let forbidden = self
            .forbidden
            .iter()
            .map(|feature| format!("uses forbidden construct: {feature}"));
        let calls = self
            .forbidden_calls
            .iter()
            .map(|name| format!("calls forbidden method: {name}"));
        let missing = self
            .missing
            .iter()
            .map(|feature| format!("missing required construct: {feature}"));
        let complexity = self.complexity.iter().map(|e| {
            format!(
                "complexity {} exceeds the limit of {} (reference has {})",
                e.submission, e.limit, e.reference
            )
        });
        let lines = self.source_lines.iter().map(|e| {
            format!(
                "{} source lines exceed the limit of {} (reference has {})",
                e.submission, e.limit, e.reference
            )
        });
        forbidden
            .chain(calls)
            .chain(missing)
            .chain(complexity)
            .chain(lines)
            .collect()
    }
}

/// Terminal judgment for one (question, submission) pair.
///
/// Built only through [`Verdict::rejected`] or [`Verdict::combine`], so it is
/// never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub question: String,
    pub submission: String,
    pub passed: bool,
    #[serde(default)]
    pub reason: Option<Reason>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub equivalence: Option<EquivalenceVerdict>,
    #[serde(default)]
    pub features: Option<FeatureVerdict>,
}

impl Verdict {
    /// A structural failure that short-circuited both checks.
    pub fn rejected(
        question: impl Into<String>,
        submission: impl Into<String>,
        reason: Reason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            submission: submission.into(),
            passed: false,
            reason: Some(reason),
            message: Some(message.into()),
            equivalence: None,
            features: None,
        }
    }

    /// Merge the dynamic and static checks. A feature violation is the
    /// primary reason when both fail.
    pub fn combine(
        question: impl Into<String>,
        submission: impl Into<String>,
        equivalence: EquivalenceVerdict,
        features: FeatureVerdict,
    ) -> Self {
        let mut messages = features.errors();
        if let Some(failure) = &equivalence.failure {
            messages.push(failure.to_string());
        }
        let reason = features
            .reason()
            .or_else(|| equivalence.failure.as_ref().map(|failure| failure.reason));
        Self {
            question: question.into(),
            submission: submission.into(),
            passed: reason.is_none(),
            reason,
            message: (!messages.is_empty()).then(|| messages.join("; ")),
            equivalence: Some(equivalence),
            features: Some(features),
        }
    }

    /// One-line description for terminals and logs.
    pub fn summary(&self) -> String {
        if self.passed {
            let cases = self
                .equivalence
                .as_ref()
                .map(|e| e.cases_run)
                .unwrap_or(0);
            return format!("passed ({cases} cases)");
        }
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("failed: {reason}: {message}"),
            (Some(reason), None) => format!("failed: {reason}"),
            _ => "failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(reason: Reason) -> CaseFailure {
        CaseFailure {
            reason,
            index: 0,
            arguments: vec![Value::Int(-1)],
            expected: "1".into(),
            found: "0".into(),
            expected_output: vec![],
            found_output: vec![],
        }
    }

    #[test]
    fn combine_passes_when_both_pass() {
        let verdict = Verdict::combine(
            "q",
            "s",
            EquivalenceVerdict {
                cases_run: 4,
                failure: None,
            },
            FeatureVerdict::default(),
        );
        assert!(verdict.passed);
        assert_eq!(verdict.reason, None);
        assert_eq!(verdict.message, None);
        assert_eq!(verdict.summary(), "passed (4 cases)");
    }

    #[test]
    fn combine_reports_equivalence_failure() {
        let verdict = Verdict::combine(
            "q",
            "s",
            EquivalenceVerdict {
                cases_run: 1,
                failure: Some(failure(Reason::ValueMismatch)),
            },
            FeatureVerdict::default(),
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, Some(Reason::ValueMismatch));
        assert_eq!(
            verdict.message.as_deref(),
            Some("value mismatch on case 0 (-1): expected 1, found 0")
        );
    }

    #[test]
    fn feature_violation_is_primary() {
        let features = FeatureVerdict {
            forbidden: vec![Feature::IfStatements],
            ..Default::default()
        };
        let verdict = Verdict::combine(
            "q",
            "s",
            EquivalenceVerdict {
                cases_run: 1,
                failure: Some(failure(Reason::Timeout)),
            },
            features,
        );
        assert_eq!(verdict.reason, Some(Reason::ForbiddenFeatureUsed));
        let message = verdict.message.unwrap();
        assert!(message.starts_with("uses forbidden construct: if statement"));
        assert!(message.contains("timeout on case 0"));
    }

    #[test]
    fn feature_verdict_reason_precedence() {
        let missing_only = FeatureVerdict {
            missing: vec![Feature::SwitchExpression],
            ..Default::default()
        };
        assert_eq!(missing_only.reason(), Some(Reason::MissingRequiredFeature));
        let calls = FeatureVerdict {
            forbidden_calls: vec!["sort".into()],
            missing: vec![Feature::SwitchExpression],
            ..Default::default()
        };
        assert_eq!(calls.reason(), Some(Reason::ForbiddenFeatureUsed));
        assert_eq!(calls.errors().len(), 2);

        let oversized = FeatureVerdict {
            complexity: Some(Excess {
                reference: 2,
                submission: 6,
                limit: 4,
            }),
            source_lines: Some(Excess {
                reference: 3,
                submission: 12,
                limit: 5,
            }),
            ..Default::default()
        };
        assert!(!oversized.passed());
        assert_eq!(oversized.reason(), Some(Reason::TooComplex));
        assert_eq!(
            oversized.errors(),
            vec![
                "complexity 6 exceeds the limit of 4 (reference has 2)".to_string(),
                "12 source lines exceed the limit of 5 (reference has 3)".to_string(),
            ]
        );
        let long_only = FeatureVerdict {
            complexity: None,
            ..oversized
        };
        assert_eq!(long_only.reason(), Some(Reason::TooLong));
    }

    #[test]
    fn rejected_verdict_has_no_checks() {
        let verdict = Verdict::rejected("q", "s", Reason::ParseFailure, "line 3");
        assert!(!verdict.passed);
        assert!(verdict.equivalence.is_none());
        assert!(verdict.features.is_none());
        assert_eq!(verdict.summary(), "failed: parse failure: line 3");
    }

    #[test]
    fn terminal_status_display() {
        assert_eq!(TerminalStatus::Returned(Value::Int(3)).to_string(), "3");
        assert_eq!(TerminalStatus::TimedOut.to_string(), "timed out");
        assert_eq!(
            TerminalStatus::Threw(Thrown::new(crate::value::ErrorKind::Assertion, "")).to_string(),
            "threw AssertionError"
        );
    }
}
