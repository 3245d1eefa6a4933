//! Equivalence runner: replays test cases against the reference and a
//! submission and stops at the first divergence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::GradingError;
use crate::generator::TestCase;
use crate::model::TestingControl;
use crate::results::{CaseFailure, EquivalenceVerdict, ExecutionObservation, Reason, TerminalStatus};
use crate::traits::Callable;
use crate::value::{ErrorKind, Value};

/// Comparison rules taken from the question's testing control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareOptions {
    /// Compare printed output line for line.
    pub check_output: bool,
    /// Error kinds the reference may legitimately raise.
    pub solution_throws: Vec<ErrorKind>,
}

impl From<&TestingControl> for CompareOptions {
    fn from(control: &TestingControl) -> Self {
        Self {
            check_output: control.check_output,
            solution_throws: control.solution_throws.clone(),
        }
    }
}

struct CachedObservation {
    arguments: Vec<Value>,
    observation: ExecutionObservation,
}

/// Reference observations keyed by case index.
///
/// Shared by every submission graded in one run. Each entry is computed at
/// most once, even when several submissions reach the same case together.
#[derive(Default)]
pub struct ReferenceCache {
    slots: Mutex<HashMap<usize, Arc<OnceLock<CachedObservation>>>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference's observation for `case`, invoking it on first use.
    pub fn observe(&self, case: &TestCase, reference: &dyn Callable) -> ExecutionObservation {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(case.index).or_default())
        };
        let cached = slot.get_or_init(|| CachedObservation {
            arguments: case.arguments.clone(),
            observation: reference.invoke(&case.arguments),
        });
        if cached.arguments == case.arguments {
            cached.observation.clone()
        } else {
            tracing::warn!(
                case = case.index,
                "cached reference observation was recorded for different arguments, recomputing"
            );
            reference.invoke(&case.arguments)
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `cases` in order against both callables.
///
/// Submission misbehavior becomes a failing verdict; reference misbehavior
/// is an infrastructure error.
pub fn run<I>(
    reference: &dyn Callable,
    submission: &dyn Callable,
    cases: I,
    options: &CompareOptions,
    cache: &ReferenceCache,
) -> Result<EquivalenceVerdict, GradingError>
where
    I: IntoIterator<Item = TestCase>,
{
    let mut cases_run = 0;
    for case in cases {
        let expected = cache.observe(&case, reference);
        let found = submission.invoke(&case.arguments);
        cases_run += 1;
        if let Some(failure) = compare(&case, &expected, &found, options)? {
            tracing::debug!(case = case.index, reason = %failure.reason, "submission diverged");
            return Ok(EquivalenceVerdict {
                cases_run,
                failure: Some(failure),
            });
        }
    }
    Ok(EquivalenceVerdict {
        cases_run,
        failure: None,
    })
}

/// Judge one case. `Ok(None)` means the observations are equivalent.
pub fn compare(
    case: &TestCase,
    expected: &ExecutionObservation,
    found: &ExecutionObservation,
    options: &CompareOptions,
) -> Result<Option<CaseFailure>, GradingError> {
    let fail = |reason: Reason, expected_text: String, found_text: String| CaseFailure {
        reason,
        index: case.index,
        arguments: case.arguments.clone(),
        expected: expected_text,
        found: found_text,
        expected_output: expected.output.clone(),
        found_output: found.output.clone(),
    };

    match &expected.status {
        TerminalStatus::TimedOut | TerminalStatus::Crashed(_) => {
            return Err(GradingError::ReferenceFailed {
                case: case.index,
                status: expected.status.to_string(),
            });
        }
        TerminalStatus::Threw(thrown) if !options.solution_throws.contains(&thrown.kind) => {
            return Err(GradingError::ReferenceFailed {
                case: case.index,
                status: format!("undeclared {}", expected.status),
            });
        }
        _ => {}
    }

    let failure = match (&expected.status, &found.status) {
        (_, TerminalStatus::TimedOut) => Some(fail(
            Reason::Timeout,
            expected.status.to_string(),
            found.status.to_string(),
        )),
        (_, TerminalStatus::Crashed(_)) => Some(fail(
            Reason::Crash,
            expected.status.to_string(),
            found.status.to_string(),
        )),
        (TerminalStatus::Threw(e), TerminalStatus::Threw(f)) if e.kind == f.kind => None,
        (TerminalStatus::Threw(_), _) | (_, TerminalStatus::Threw(_)) => Some(fail(
            Reason::ErrorKindMismatch,
            expected.status.to_string(),
            found.status.to_string(),
        )),
        (TerminalStatus::Returned(a), TerminalStatus::Returned(b)) if a != b => {
            Some(fail(Reason::ValueMismatch, a.to_string(), b.to_string()))
        }
        _ if options.check_output => output_mismatch(expected, found)
            .map(|(expected_text, found_text)| fail(Reason::OutputMismatch, expected_text, found_text)),
        _ => None,
    };
    Ok(failure)
}

/// First differing output line, rendered for diagnostics.
fn output_mismatch(
    expected: &ExecutionObservation,
    found: &ExecutionObservation,
) -> Option<(String, String)> {
    let render = |line: Option<&String>| match line {
        Some(text) => format!("{text:?}"),
        None => "end of output".to_string(),
    };
    let longest = expected.output.len().max(found.output.len());
    if let Some(i) = (0..longest).find(|&i| expected.output.get(i) != found.output.get(i)) {
        return Some((
            format!("line {}: {}", i + 1, render(expected.output.get(i))),
            render(found.output.get(i)),
        ));
    }
    if expected.truncated_lines != found.truncated_lines {
        return Some((
            format!("{} truncated lines", expected.truncated_lines),
            format!("{} truncated lines", found.truncated_lines),
        ));
    }
    None
}
