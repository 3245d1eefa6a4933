//! Test input generation.
//!
//! A fixed list is replayed verbatim. Otherwise boundary rows come first,
//! followed by seeded random draws. The sequence is lazy, and calling
//! [`InputGenerator::cases`] again restarts it from the same seed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::model::{ParameterConstraint, ParameterDomain, QuestionDescriptor};
use crate::value::Value;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
const MIX_CONST1: u64 = 0xBF58_476D_1CE4_E5B9;
const MIX_CONST2: u64 = 0x94D0_49BB_1331_11EB;

/// Seed used when neither the question nor the configuration pins one.
pub const DEFAULT_SEED: u64 = 124;

/// SplitMix64 generator. Small, fast, and fully determined by its seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(MIX_CONST1);
        z = (z ^ (z >> 27)).wrapping_mul(MIX_CONST2);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    pub fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Uniform in `[0, upper_bound)`, without modulo bias. Zero yields zero.
    pub fn bounded_u64(&mut self, upper_bound: u64) -> u64 {
        if upper_bound == 0 {
            return 0;
        }
        let zone = u64::MAX - (u64::MAX % upper_bound);
        loop {
            let x = self.next_u64();
            if x < zone {
                return x % upper_bound;
            }
        }
    }

    /// Uniform in `[min, max]`.
    pub fn range_i64(&mut self, min: i64, max: i64) -> i64 {
        let span = (max as i128 - min as i128 + 1) as u128;
        if span > u64::MAX as u128 {
            return self.next_u64() as i64;
        }
        (min as i128 + self.bounded_u64(span as u64) as i128) as i64
    }

    pub fn range_usize(&mut self, min: usize, max: usize) -> usize {
        self.range_i64(min as i64, max as i64) as usize
    }
}

/// Where a test case came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOrigin {
    Fixed,
    Boundary,
    Random,
}

impl fmt::Display for CaseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOrigin::Fixed => write!(f, "fixed"),
            CaseOrigin::Boundary => write!(f, "boundary"),
            CaseOrigin::Random => write!(f, "random"),
        }
    }
}

/// One concrete input tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub index: usize,
    pub arguments: Vec<Value>,
    pub origin: CaseOrigin,
}

/// Produces the test cases for one question under one seed.
#[derive(Debug, Clone)]
pub struct InputGenerator {
    domain: ParameterDomain,
    seed: u64,
    include_boundaries: bool,
    test_count: usize,
    max_test_count: usize,
}

impl InputGenerator {
    /// Validate the question's parameter domain against its signature.
    pub fn new(descriptor: &QuestionDescriptor, seed: u64) -> Result<Self, GradingError> {
        let parameters = &descriptor.signature.parameters;
        let domain = match &descriptor.parameters {
            ParameterDomain::Fixed(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != parameters.len() {
                        return Err(GradingError::InvalidQuestion(format!(
                            "fixed row {i} has {} values, signature takes {}",
                            row.len(),
                            parameters.len()
                        )));
                    }
                    for (value, ty) in row.iter().zip(parameters) {
                        if !ty.accepts(value) {
                            return Err(GradingError::InvalidQuestion(format!(
                                "fixed row {i}: {value} is not a valid {ty}"
                            )));
                        }
                    }
                }
                ParameterDomain::Fixed(rows.clone())
            }
            // A method without parameters needs exactly one call.
            ParameterDomain::Generate(constraints) if constraints.is_empty() && parameters.is_empty() => {
                ParameterDomain::Fixed(vec![Vec::new()])
            }
            ParameterDomain::Generate(constraints) => {
                if constraints.len() != parameters.len() {
                    return Err(GradingError::InvalidQuestion(format!(
                        "{} generation constraints declared, signature takes {}",
                        constraints.len(),
                        parameters.len()
                    )));
                }
                for (i, (constraint, ty)) in constraints.iter().zip(parameters).enumerate() {
                    if constraint.value_type() != *ty {
                        return Err(GradingError::InvalidQuestion(format!(
                            "parameter {i} is {ty} but its constraint generates {}",
                            constraint.value_type()
                        )));
                    }
                    constraint.check().map_err(|e| {
                        GradingError::InvalidQuestion(format!("parameter {i}: {e}"))
                    })?;
                }
                ParameterDomain::Generate(constraints.clone())
            }
        };

        let control = &descriptor.control;
        Ok(Self {
            domain,
            seed,
            include_boundaries: control.include_boundaries,
            test_count: control.test_count,
            max_test_count: control.max_test_count,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Boundary rows, in the order they are emitted.
    pub fn boundary_rows(&self) -> Vec<Vec<Value>> {
        match &self.domain {
            ParameterDomain::Generate(constraints) if self.include_boundaries => {
                boundary_rows(constraints)
            }
            _ => Vec::new(),
        }
    }

    /// Total number of cases the sequence will yield.
    pub fn case_count(&self) -> usize {
        match &self.domain {
            ParameterDomain::Fixed(rows) => rows.len(),
            ParameterDomain::Generate(_) => {
                (self.boundary_rows().len() + self.test_count).min(self.max_test_count)
            }
        }
    }

    /// A fresh lazy sequence, starting over from the seed.
    pub fn cases(&self) -> TestCases {
        let source = match &self.domain {
            ParameterDomain::Fixed(rows) => CaseSource::Fixed(rows.clone().into_iter()),
            ParameterDomain::Generate(constraints) => CaseSource::Generated {
                constraints: constraints.clone(),
                boundaries: self.boundary_rows().into_iter(),
                rng: SplitMix64::new(self.seed),
                random_remaining: self.test_count,
                cap: self.max_test_count,
            },
        };
        TestCases { source, index: 0 }
    }
}

/// Lazy test case sequence produced by [`InputGenerator::cases`].
#[derive(Debug)]
pub struct TestCases {
    source: CaseSource,
    index: usize,
}

#[derive(Debug)]
enum CaseSource {
    Fixed(std::vec::IntoIter<Vec<Value>>),
    Generated {
        constraints: Vec<ParameterConstraint>,
        boundaries: std::vec::IntoIter<Vec<Value>>,
        rng: SplitMix64,
        random_remaining: usize,
        cap: usize,
    },
}

impl Iterator for TestCases {
    type Item = TestCase;

    fn next(&mut self) -> Option<TestCase> {
        let (arguments, origin) = match &mut self.source {
            CaseSource::Fixed(rows) => (rows.next()?, CaseOrigin::Fixed),
            CaseSource::Generated {
                constraints,
                boundaries,
                rng,
                random_remaining,
                cap,
            } => {
                if self.index >= *cap {
                    return None;
                }
                if let Some(row) = boundaries.next() {
                    (row, CaseOrigin::Boundary)
                } else if *random_remaining > 0 {
                    *random_remaining -= 1;
                    let row = constraints.iter().map(|c| draw(c, rng)).collect();
                    (row, CaseOrigin::Random)
                } else {
                    return None;
                }
            }
        };
        let case = TestCase {
            index: self.index,
            arguments,
            origin,
        };
        self.index += 1;
        Some(case)
    }
}

fn push_unique(values: &mut Vec<Value>, value: Value) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// Edge values for one parameter: zero, negative, empty, null where legal.
pub fn boundary_values(constraint: &ParameterConstraint) -> Vec<Value> {
    let mut values = Vec::new();
    match constraint {
        ParameterConstraint::Int { min, max } => {
            for n in [0, -1, 1, *min, *max] {
                if (*min..=*max).contains(&n) {
                    push_unique(&mut values, Value::Int(n));
                }
            }
        }
        ParameterConstraint::Long { min, max } => {
            for n in [0, -1, 1, *min, *max] {
                if (*min..=*max).contains(&n) {
                    push_unique(&mut values, Value::Long(n));
                }
            }
        }
        ParameterConstraint::Double { min, max } => {
            for x in [0.0, -1.0, 1.0, *min, *max] {
                if x >= *min && x <= *max {
                    push_unique(&mut values, Value::Double(x));
                }
            }
        }
        ParameterConstraint::Boolean => {
            values.push(Value::Boolean(true));
            values.push(Value::Boolean(false));
        }
        ParameterConstraint::Char { charset } => {
            let chars = charset.chars();
            if let Some(first) = chars.first() {
                push_unique(&mut values, Value::Char(*first));
            }
            if let Some(last) = chars.last() {
                push_unique(&mut values, Value::Char(*last));
            }
        }
        ParameterConstraint::String {
            min_length,
            max_length,
            charset,
            nullable,
        } => {
            if *nullable {
                values.push(Value::Null);
            }
            if *min_length == 0 {
                values.push(Value::String(String::new()));
            }
            let short = (*min_length).max(1);
            if let (Some(first), true) = (charset.chars().first(), short <= *max_length) {
                push_unique(&mut values, Value::String(first.to_string().repeat(short)));
            }
        }
        ParameterConstraint::IntArray {
            min_length,
            max_length,
            min,
            max,
            nullable,
        } => {
            if *nullable {
                values.push(Value::Null);
            }
            if *min_length == 0 {
                values.push(Value::IntArray(Vec::new()));
            }
            let short = (*min_length).max(1);
            if short <= *max_length {
                let element = if (*min..=*max).contains(&0) { 0 } else { *min };
                push_unique(&mut values, Value::IntArray(vec![element; short]));
            }
        }
    }
    values
}

/// Combine per-parameter boundary lists cyclically; the longest list sets
/// the row count.
fn boundary_rows(constraints: &[ParameterConstraint]) -> Vec<Vec<Value>> {
    let lists: Vec<Vec<Value>> = constraints.iter().map(boundary_values).collect();
    let rows = lists.iter().map(Vec::len).max().unwrap_or(0);
    if lists.iter().any(Vec::is_empty) {
        return Vec::new();
    }
    (0..rows)
        .map(|i| lists.iter().map(|list| list[i % list.len()].clone()).collect())
        .collect()
}

fn draw(constraint: &ParameterConstraint, rng: &mut SplitMix64) -> Value {
    match constraint {
        ParameterConstraint::Int { min, max } => {
            Value::Int(rng.range_i64(*min as i64, *max as i64) as i32)
        }
        ParameterConstraint::Long { min, max } => Value::Long(rng.range_i64(*min, *max)),
        ParameterConstraint::Double { min, max } => {
            // `max - min` can overflow for wide ranges; interpolate instead.
            let t = rng.next_f64();
            Value::Double((min * (1.0 - t) + max * t).clamp(*min, *max))
        }
        ParameterConstraint::Boolean => Value::Boolean(rng.next_bool()),
        ParameterConstraint::Char { charset } => {
            let chars = charset.chars();
            Value::Char(chars[rng.bounded_u64(chars.len() as u64) as usize])
        }
        ParameterConstraint::String {
            min_length,
            max_length,
            charset,
            nullable,
        } => {
            if *nullable && rng.bounded_u64(16) == 0 {
                return Value::Null;
            }
            let chars = charset.chars();
            let len = rng.range_usize(*min_length, *max_length);
            let text = (0..len)
                .map(|_| chars[rng.bounded_u64(chars.len() as u64) as usize])
                .collect();
            Value::String(text)
        }
        ParameterConstraint::IntArray {
            min_length,
            max_length,
            min,
            max,
            nullable,
        } => {
            if *nullable && rng.bounded_u64(16) == 0 {
                return Value::Null;
            }
            let len = rng.range_usize(*min_length, *max_length);
            let items = (0..len)
                .map(|_| rng.range_i64(*min as i64, *max as i64) as i32)
                .collect();
            Value::IntArray(items)
        }
    }
}
