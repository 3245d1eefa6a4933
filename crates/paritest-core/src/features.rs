//! Language constructs recognized in submitted source, and the policy
//! declaring which of them a submission must or must not use.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::GradingError;
use crate::model::QuestionType;

/// A syntactic construct the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    IfStatements,
    ElseStatements,
    ElseIf,
    #[serde(alias = "TERNARY_OPERATOR", alias = "IF_EXPRESSIONS")]
    ConditionalExpression,
    /// `switch` used as a statement.
    Switch,
    /// `switch` used as an expression.
    SwitchExpression,
    ForLoops,
    EnhancedFor,
    WhileLoops,
    DoWhileLoops,
    Assert,
    TryBlock,
    Throw,
    Break,
    Continue,
    LambdaExpressions,
}

impl Feature {
    pub const ALL: [Feature; 16] = [
        Feature::IfStatements,
        Feature::ElseStatements,
        Feature::ElseIf,
        Feature::ConditionalExpression,
        Feature::Switch,
        Feature::SwitchExpression,
        Feature::ForLoops,
        Feature::EnhancedFor,
        Feature::WhileLoops,
        Feature::DoWhileLoops,
        Feature::Assert,
        Feature::TryBlock,
        Feature::Throw,
        Feature::Break,
        Feature::Continue,
        Feature::LambdaExpressions,
    ];

    /// Identifier used in question files.
    pub fn key(&self) -> &'static str {
        match self {
            Feature::IfStatements => "IF_STATEMENTS",
            Feature::ElseStatements => "ELSE_STATEMENTS",
            Feature::ElseIf => "ELSE_IF",
            Feature::ConditionalExpression => "CONDITIONAL_EXPRESSION",
            Feature::Switch => "SWITCH",
            Feature::SwitchExpression => "SWITCH_EXPRESSION",
            Feature::ForLoops => "FOR_LOOPS",
            Feature::EnhancedFor => "ENHANCED_FOR",
            Feature::WhileLoops => "WHILE_LOOPS",
            Feature::DoWhileLoops => "DO_WHILE_LOOPS",
            Feature::Assert => "ASSERT",
            Feature::TryBlock => "TRY_BLOCK",
            Feature::Throw => "THROW",
            Feature::Break => "BREAK",
            Feature::Continue => "CONTINUE",
            Feature::LambdaExpressions => "LAMBDA_EXPRESSIONS",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::IfStatements => "if statement",
            Feature::ElseStatements => "else statement",
            Feature::ElseIf => "else if",
            Feature::ConditionalExpression => "conditional expression",
            Feature::Switch => "switch statement",
            Feature::SwitchExpression => "switch expression",
            Feature::ForLoops => "for loop",
            Feature::EnhancedFor => "enhanced for loop",
            Feature::WhileLoops => "while loop",
            Feature::DoWhileLoops => "do-while loop",
            Feature::Assert => "assert statement",
            Feature::TryBlock => "try block",
            Feature::Throw => "throw statement",
            Feature::Break => "break",
            Feature::Continue => "continue",
            Feature::LambdaExpressions => "lambda expression",
        };
        f.write_str(name)
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        match wanted.as_str() {
            "TERNARY_OPERATOR" | "IF_EXPRESSIONS" => Ok(Feature::ConditionalExpression),
            _ => Feature::ALL
                .into_iter()
                .find(|feature| feature.key() == wanted)
                .ok_or_else(|| format!("unknown feature: {s}")),
        }
    }
}

/// The constructs found in one source unit.
///
/// Counts are kept so reports can show how often something was used, but
/// policies only care about presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub counts: BTreeMap<Feature, u32>,
    /// Names of invoked methods, e.g. `forEach` or `sort`.
    #[serde(default)]
    pub method_calls: BTreeSet<String>,
    /// Cyclomatic complexity summed over all method bodies.
    #[serde(default)]
    pub complexity: u32,
    /// Lines holding code, excluding blanks and comments.
    #[serde(default)]
    pub source_lines: u32,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, feature: Feature) {
        *self.counts.entry(feature).or_insert(0) += 1;
    }

    pub fn record_call(&mut self, name: impl Into<String>) {
        self.method_calls.insert(name.into());
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.count(feature) > 0
    }

    pub fn count(&self, feature: Feature) -> u32 {
        self.counts.get(&feature).copied().unwrap_or(0)
    }

    pub fn calls(&self, name: &str) -> bool {
        self.method_calls.contains(name)
    }

    /// Features present, in a stable order.
    pub fn present(&self) -> impl Iterator<Item = Feature> + '_ {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(feature, _)| *feature)
    }

    /// Whether any loop form is used, counting `forEach` calls as loops.
    pub fn uses_loop(&self) -> bool {
        [
            Feature::ForLoops,
            Feature::EnhancedFor,
            Feature::WhileLoops,
            Feature::DoWhileLoops,
        ]
        .into_iter()
        .any(|feature| self.has(feature))
            || self.calls("forEach")
    }
}

/// Constructs a submission must or must not use, and how far it may exceed
/// the reference in complexity and length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePolicy {
    #[serde(default)]
    pub required: BTreeSet<Feature>,
    #[serde(default)]
    pub forbidden: BTreeSet<Feature>,
    /// Method names the submission may not invoke.
    #[serde(default)]
    pub forbidden_calls: BTreeSet<String>,
    /// Treat every construct the reference does not use as forbidden.
    #[serde(default)]
    pub within_reference: bool,
    /// Forbid all loop forms, `forEach` included.
    #[serde(default)]
    pub forbid_loops: bool,
    /// Decision points a submission may add over the reference.
    #[serde(default)]
    pub max_extra_complexity: Option<u32>,
    /// Source lines a submission may have, as a multiple of the reference's.
    #[serde(default)]
    pub max_source_line_ratio: Option<f64>,
    /// Extra source lines always allowed when a line ratio is set.
    #[serde(default = "default_min_extra_source_lines")]
    pub min_extra_source_lines: u32,
}

fn default_min_extra_source_lines() -> u32 {
    2
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        Self {
            required: BTreeSet::new(),
            forbidden: BTreeSet::new(),
            forbidden_calls: BTreeSet::new(),
            within_reference: false,
            forbid_loops: false,
            max_extra_complexity: None,
            max_source_line_ratio: None,
            min_extra_source_lines: default_min_extra_source_lines(),
        }
    }
}

impl FeaturePolicy {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
            && self.forbidden.is_empty()
            && self.forbidden_calls.is_empty()
            && !self.within_reference
            && !self.forbid_loops
            && self.max_extra_complexity.is_none()
            && self.max_source_line_ratio.is_none()
    }

    /// Highest complexity allowed given the reference's.
    pub fn complexity_limit(&self, reference: u32) -> Option<u32> {
        self.max_extra_complexity
            .map(|extra| reference.saturating_add(extra))
    }

    /// Most source lines allowed given the reference's. A submission must
    /// exceed both the ratio and the fixed allowance to go over.
    pub fn source_line_limit(&self, reference: u32) -> Option<u32> {
        self.max_source_line_ratio.map(|ratio| {
            let scaled = (f64::from(reference) * ratio) as u32;
            scaled.max(reference.saturating_add(self.min_extra_source_lines))
        })
    }

    /// Policy entries that contradict each other.
    pub fn conflicts(&self) -> Vec<Feature> {
        self.required.intersection(&self.forbidden).copied().collect()
    }
}

/// Collaborator that turns source text into a [`FeatureSet`].
///
/// Extraction is purely syntactic. Invalid source yields
/// [`GradingError::Parse`].
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, source: &str) -> Result<FeatureSet, GradingError>;

    /// Extract from source known to have the given shape.
    fn extract_as(
        &self,
        source: &str,
        question_type: QuestionType,
    ) -> Result<FeatureSet, GradingError> {
        let _ = question_type;
        self.extract(source)
    }
}
