//! Grading error types.
//!
//! Submission-caused conditions (bad syntax, a class that cannot be built, a
//! method with the wrong signature) are represented here so the engine can
//! turn them into failing verdicts. Everything else aborts the grading run.

use thiserror::Error;

/// Errors raised while preparing or grading a submission.
#[derive(Debug, Error)]
pub enum GradingError {
    /// The source unit is not syntactically valid.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The implementation could not be instantiated.
    #[error("construction failed: {0}")]
    Construction(String),

    /// The implementation's signature does not match the declared entry point.
    #[error("unsupported shape: expected `{expected}`, found `{found}`")]
    UnsupportedShape { expected: String, found: String },

    /// The reference solution misbehaved on a test case.
    #[error("reference solution failed on case {case}: {status}")]
    ReferenceFailed { case: usize, status: String },

    /// The question descriptor is unusable.
    #[error("invalid question: {0}")]
    InvalidQuestion(String),

    /// The feature extractor itself failed (not the source it was given).
    #[error("feature extractor failed: {0}")]
    Extractor(String),

    /// A grading worker died before producing a verdict.
    #[error("grading worker failed: {0}")]
    WorkerFailed(String),
}

impl GradingError {
    /// Returns `true` if the submission caused this error, in which case it
    /// becomes a failing verdict instead of aborting the run.
    pub fn is_submission_fault(&self) -> bool {
        matches!(
            self,
            GradingError::Parse { .. }
                | GradingError::Construction(_)
                | GradingError::UnsupportedShape { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_faults_are_classified() {
        assert!(GradingError::Parse {
            line: 3,
            message: "unexpected token".into()
        }
        .is_submission_fault());
        assert!(GradingError::Construction("boom".into()).is_submission_fault());
        assert!(!GradingError::ReferenceFailed {
            case: 0,
            status: "timed out".into()
        }
        .is_submission_fault());
        assert!(!GradingError::Extractor("no language".into()).is_submission_fault());
    }

    #[test]
    fn display_includes_line() {
        let err = GradingError::Parse {
            line: 7,
            message: "missing `;`".into(),
        };
        assert_eq!(err.to_string(), "parse error at line 7: missing `;`");
    }
}
