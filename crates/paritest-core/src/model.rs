//! Core data model types for paritest.
//!
//! A question is loaded once, from a TOML descriptor plus its reference
//! implementation, and is never mutated afterwards. Submissions are graded
//! against it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::features::FeaturePolicy;
use crate::traits::Implementation;
use crate::value::{Value, ValueType};

/// Opaque bookkeeping about a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub citation: Option<String>,
}

/// The shape of source a student submits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// A complete class.
    Klass,
    /// One or more methods, without the enclosing class.
    #[default]
    Method,
    /// Bare statements.
    Snippet,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Klass => write!(f, "klass"),
            QuestionType::Method => write!(f, "method"),
            QuestionType::Snippet => write!(f, "snippet"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "klass" | "class" => Ok(QuestionType::Klass),
            "method" => Ok(QuestionType::Method),
            "snippet" => Ok(QuestionType::Snippet),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// How the entry point is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Ordinary call; output is whatever was printed before it returned.
    #[default]
    Direct,
    /// The entry point runs on a freshly spawned thread and owns its own
    /// lifecycle; output is collected until every context it spawned is done.
    AutoStart,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Direct => write!(f, "direct"),
            ExecutionMode::AutoStart => write!(f, "auto_start"),
        }
    }
}

/// Declared entry point of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ValueType>,
    #[serde(default = "default_returns")]
    pub returns: ValueType,
}

fn default_returns() -> ValueType {
    ValueType::Void
}

impl Signature {
    pub fn new(name: impl Into<String>, parameters: Vec<ValueType>, returns: ValueType) -> Self {
        Self {
            name: name.into(),
            parameters,
            returns,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameters.iter().map(ValueType::to_string).collect();
        write!(f, "{} {}({})", self.returns, self.name, params.join(", "))
    }
}

/// Characters a generated `char` or `String` may contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharSet {
    #[default]
    Alphanumeric,
    Alphabetic,
    Numeric,
    /// Printable ASCII, space through tilde.
    Printable,
    Custom(String),
}

impl CharSet {
    pub fn chars(&self) -> Vec<char> {
        match self {
            CharSet::Alphanumeric => ('a'..='z').chain('A'..='Z').chain('0'..='9').collect(),
            CharSet::Alphabetic => ('a'..='z').chain('A'..='Z').collect(),
            CharSet::Numeric => ('0'..='9').collect(),
            CharSet::Printable => (' '..='~').collect(),
            CharSet::Custom(chars) => chars.chars().collect(),
        }
    }
}

/// Generation constraint for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterConstraint {
    Int {
        #[serde(default = "default_int_min")]
        min: i32,
        #[serde(default = "default_int_max")]
        max: i32,
    },
    Long {
        #[serde(default = "default_long_min")]
        min: i64,
        #[serde(default = "default_long_max")]
        max: i64,
    },
    Double {
        #[serde(default = "default_double_min")]
        min: f64,
        #[serde(default = "default_double_max")]
        max: f64,
    },
    Boolean,
    Char {
        #[serde(default)]
        charset: CharSet,
    },
    String {
        #[serde(default)]
        min_length: usize,
        #[serde(default = "default_max_length")]
        max_length: usize,
        #[serde(default)]
        charset: CharSet,
        #[serde(default)]
        nullable: bool,
    },
    IntArray {
        #[serde(default)]
        min_length: usize,
        #[serde(default = "default_max_length")]
        max_length: usize,
        #[serde(default = "default_int_min")]
        min: i32,
        #[serde(default = "default_int_max")]
        max: i32,
        #[serde(default)]
        nullable: bool,
    },
}

fn default_int_min() -> i32 {
    -1024
}
fn default_int_max() -> i32 {
    1024
}
fn default_long_min() -> i64 {
    -1_000_000
}
fn default_long_max() -> i64 {
    1_000_000
}
fn default_double_min() -> f64 {
    -1024.0
}
fn default_double_max() -> f64 {
    1024.0
}
fn default_max_length() -> usize {
    16
}

impl ParameterConstraint {
    /// The value type this constraint generates.
    pub fn value_type(&self) -> ValueType {
        match self {
            ParameterConstraint::Int { .. } => ValueType::Int,
            ParameterConstraint::Long { .. } => ValueType::Long,
            ParameterConstraint::Double { .. } => ValueType::Double,
            ParameterConstraint::Boolean => ValueType::Boolean,
            ParameterConstraint::Char { .. } => ValueType::Char,
            ParameterConstraint::String { .. } => ValueType::String,
            ParameterConstraint::IntArray { .. } => ValueType::IntArray,
        }
    }

    /// Check that the constraint describes a non-empty domain.
    pub fn check(&self) -> Result<(), String> {
        match self {
            ParameterConstraint::Int { min, max } if min > max => {
                Err(format!("int range is empty: {min} > {max}"))
            }
            ParameterConstraint::Long { min, max } if min > max => {
                Err(format!("long range is empty: {min} > {max}"))
            }
            ParameterConstraint::Double { min, max }
                if !min.is_finite() || !max.is_finite() =>
            {
                Err(format!("double bounds must be finite: {min}..{max}"))
            }
            ParameterConstraint::Double { min, max } if min > max => {
                Err(format!("double range is empty: {min} > {max}"))
            }
            ParameterConstraint::Char { charset }
            | ParameterConstraint::String { charset, .. }
                if charset.chars().is_empty() =>
            {
                Err("charset is empty".to_string())
            }
            ParameterConstraint::String {
                min_length,
                max_length,
                ..
            }
            | ParameterConstraint::IntArray {
                min_length,
                max_length,
                ..
            } if min_length > max_length => Err(format!(
                "length range is empty: {min_length} > {max_length}"
            )),
            ParameterConstraint::IntArray { min, max, .. } if min > max => {
                Err(format!("element range is empty: {min} > {max}"))
            }
            _ => Ok(()),
        }
    }
}

/// Where a question's inputs come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDomain {
    /// Literal argument tuples, used verbatim and in order.
    Fixed(Vec<Vec<Value>>),
    /// One constraint per parameter.
    Generate(Vec<ParameterConstraint>),
}

impl Default for ParameterDomain {
    fn default() -> Self {
        ParameterDomain::Generate(Vec::new())
    }
}

/// Knobs controlling how a question is exercised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingControl {
    /// Pinned seed; the configured default applies when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Number of random cases drawn after the boundary cases.
    #[serde(default = "default_test_count")]
    pub test_count: usize,
    /// Hard cap on the total number of cases.
    #[serde(default = "default_max_test_count")]
    pub max_test_count: usize,
    #[serde(default = "default_true")]
    pub include_boundaries: bool,
    /// Per-invocation timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bound on waiting for an auto-started entry point to settle.
    #[serde(default = "default_timeout_ms")]
    pub auto_start_wait_ms: u64,
    /// Compare printed output line for line.
    #[serde(default = "default_true")]
    pub check_output: bool,
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,
    /// Error kinds the reference is allowed to raise.
    #[serde(default)]
    pub solution_throws: Vec<crate::value::ErrorKind>,
}

impl Default for TestingControl {
    fn default() -> Self {
        Self {
            seed: None,
            test_count: default_test_count(),
            max_test_count: default_max_test_count(),
            include_boundaries: true,
            timeout_ms: default_timeout_ms(),
            auto_start_wait_ms: default_timeout_ms(),
            check_output: true,
            max_output_lines: default_max_output_lines(),
            solution_throws: Vec::new(),
        }
    }
}

fn default_test_count() -> usize {
    64
}
fn default_max_test_count() -> usize {
    1024
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_max_output_lines() -> usize {
    1024
}
fn default_true() -> bool {
    true
}

/// Everything declared about a question apart from its implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDescriptor {
    pub metadata: Metadata,
    #[serde(default)]
    pub question_type: QuestionType,
    pub signature: Signature,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub parameters: ParameterDomain,
    #[serde(default)]
    pub features: FeaturePolicy,
    #[serde(default)]
    pub control: TestingControl,
}

/// A candidate implementation paired with the source text it stands for.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub source: String,
    pub implementation: Implementation,
}

impl Submission {
    pub fn new(id: impl Into<String>, source: impl Into<String>, implementation: Implementation) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            implementation,
        }
    }
}

/// A graded exercise: descriptor, reference, and validation examples.
#[derive(Debug, Clone)]
pub struct Question {
    pub descriptor: QuestionDescriptor,
    pub reference: Submission,
    /// Alternate solutions that must also pass.
    pub also_correct: Vec<Submission>,
    /// Known-bad solutions that must fail.
    pub incorrect: Vec<Submission>,
}

impl Question {
    pub fn new(descriptor: QuestionDescriptor, reference: Submission) -> Self {
        Self {
            descriptor,
            reference,
            also_correct: Vec::new(),
            incorrect: Vec::new(),
        }
    }

    pub fn with_also_correct(mut self, submission: Submission) -> Self {
        self.also_correct.push(submission);
        self
    }

    pub fn with_incorrect(mut self, submission: Submission) -> Self {
        self.incorrect.push(submission);
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.metadata.name
    }
}
