//! paritest-runner: Sandboxed invocation and Java feature extraction.
//!
//! Runs every invocation either on an isolated worker thread (panic capture,
//! bounded waits, output collection) or in a fresh worker process that is
//! killed at its deadline, and extracts language constructs from Java source
//! with tree-sitter.

pub mod java;
pub mod process;
pub mod sandbox;
pub mod worker;
pub mod wrapper;

use std::sync::Arc;

use paritest_core::engine::{GradingConfig, GradingEngine};
use paritest_core::error::GradingError;
use paritest_core::features::{FeatureExtractor, FeatureSet};
use paritest_core::model::{ExecutionMode, QuestionType, Signature};
use paritest_core::traits::{Callable, CallableWrapper, Implementation, InvocationLimits};

use crate::java::JavaExtractor;
use crate::process::{ProcessWrapper, WorkerCommand};
use crate::wrapper::ThreadWrapper;

/// Where invocations run.
#[derive(Debug, Clone)]
enum Isolation {
    /// Worker threads in this process. A stack overflow or an abort in an
    /// implementation takes the whole process down.
    Threads(ThreadWrapper),
    /// One worker process per invocation.
    Processes(ProcessWrapper),
}

/// Local harness: sandboxed callables plus the Java extractor.
#[derive(Debug, Clone)]
pub struct LocalHarness {
    isolation: Isolation,
    extractor: JavaExtractor,
}

impl Default for LocalHarness {
    fn default() -> Self {
        Self {
            isolation: Isolation::Threads(ThreadWrapper),
            extractor: JavaExtractor::new(),
        }
    }
}

impl LocalHarness {
    /// In-process harness for trusted implementations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Harness that runs every invocation in a worker started by `command`.
    /// Implementations must come from the worker's
    /// [`WorkerRegistry`](crate::worker::WorkerRegistry).
    pub fn isolated(command: WorkerCommand) -> Self {
        Self {
            isolation: Isolation::Processes(ProcessWrapper::new(command)),
            extractor: JavaExtractor::new(),
        }
    }

    /// A grading engine backed by this harness.
    pub fn engine(self, config: GradingConfig) -> GradingEngine {
        let harness = Arc::new(self);
        GradingEngine::new(
            Arc::clone(&harness) as Arc<dyn CallableWrapper>,
            harness as Arc<dyn FeatureExtractor>,
            config,
        )
    }
}

impl CallableWrapper for LocalHarness {
    fn wrap(
        &self,
        implementation: &Implementation,
        expected: &Signature,
        mode: ExecutionMode,
        limits: InvocationLimits,
    ) -> Result<Arc<dyn Callable>, GradingError> {
        match &self.isolation {
            Isolation::Threads(wrapper) => wrapper.wrap(implementation, expected, mode, limits),
            Isolation::Processes(wrapper) => wrapper.wrap(implementation, expected, mode, limits),
        }
    }
}

impl FeatureExtractor for LocalHarness {
    fn extract(&self, source: &str) -> Result<FeatureSet, GradingError> {
        self.extractor.extract(source)
    }

    fn extract_as(
        &self,
        source: &str,
        question_type: QuestionType,
    ) -> Result<FeatureSet, GradingError> {
        self.extractor.extract_as(source, question_type)
    }
}

#[cfg(test)]
mod tests {
    use paritest_core::engine::NoopReporter;
    use paritest_core::features::Feature;
    use paritest_core::model::{Metadata, ParameterDomain, Question, QuestionDescriptor, Submission};
    use paritest_core::results::Reason;
    use paritest_core::value::{Value, ValueType};

    use super::*;

    fn add_two() -> Signature {
        Signature::new("addTwo", vec![ValueType::Int], ValueType::Int)
    }

    fn question() -> Question {
        let descriptor = QuestionDescriptor {
            metadata: Metadata {
                name: "Add Two".into(),
                version: "1".into(),
                ..Default::default()
            },
            question_type: QuestionType::Method,
            signature: add_two(),
            mode: ExecutionMode::Direct,
            parameters: ParameterDomain::Fixed(vec![
                vec![Value::Int(-1)],
                vec![Value::Int(0)],
                vec![Value::Int(2)],
                vec![Value::Int(100)],
            ]),
            features: Default::default(),
            control: Default::default(),
        };
        let reference = Submission::new(
            "reference",
            "int addTwo(int value) { return value + 2; }",
            Implementation::function(add_two(), |args, _| match args {
                [Value::Int(v)] => Ok(Value::Int(v + 2)),
                _ => Ok(Value::Int(0)),
            }),
        );
        Question::new(descriptor, reference)
    }

    #[test]
    fn harness_delegates_extraction() {
        let features = LocalHarness::new()
            .extract_as("int f(int v) { return v > 0 ? v : -v; }", QuestionType::Method)
            .unwrap();
        assert!(features.has(Feature::ConditionalExpression));
    }

    #[tokio::test]
    async fn engine_grades_with_real_sandbox() {
        let engine = LocalHarness::new().engine(GradingConfig::default());
        let question = Arc::new(question());
        let off_by_one = Submission::new(
            "off-by-one",
            "int addTwo(int value) { return value + 1; }",
            Implementation::function(add_two(), |args, _| match args {
                [Value::Int(v)] => Ok(Value::Int(v + 1)),
                _ => Ok(Value::Int(0)),
            }),
        );
        let report = engine
            .grade(question, vec![off_by_one], &NoopReporter)
            .await
            .unwrap();
        let verdict = &report.verdicts[0];
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, Some(Reason::ValueMismatch));
        let failure = verdict.equivalence.as_ref().and_then(|e| e.failure.as_ref()).unwrap();
        assert_eq!(failure.arguments, vec![Value::Int(-1)]);
    }
}
