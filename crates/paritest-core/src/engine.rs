//! Central grading engine.
//!
//! Prepares a question once (reference wrapper, reference features, input
//! generator, observation cache) and grades submissions against it in
//! parallel. Each submission walks the same pipeline: extract features, wrap,
//! run equivalence, check features, combine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::checker;
use crate::equivalence::{self, CompareOptions, ReferenceCache};
use crate::error::GradingError;
use crate::features::{FeatureExtractor, FeatureSet};
use crate::generator::{InputGenerator, DEFAULT_SEED};
use crate::model::{Question, Submission};
use crate::report::{GradingReport, GradingSummary, QuestionInfo};
use crate::results::{FeatureVerdict, Reason, Verdict};
use crate::traits::{Callable, CallableWrapper, InvocationLimits};

/// Configuration for the grading engine.
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Maximum submissions graded concurrently.
    pub parallelism: usize,
    /// Seed for questions that do not pin one.
    pub default_seed: u64,
    /// Scales every per-question timeout.
    pub timeout_multiplier: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            default_seed: DEFAULT_SEED,
            timeout_multiplier: 1.0,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_submission_start(&self, question: &str, submission: &str);
    fn on_verdict(&self, verdict: &Verdict);
    fn on_error(&self, question: &str, submission: &str, error: &str);
    fn on_run_complete(&self, total: usize, passed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_submission_start(&self, _: &str, _: &str) {}
    fn on_verdict(&self, _: &Verdict) {}
    fn on_error(&self, _: &str, _: &str, _: &str) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Outcome of checking a question against its own examples.
#[derive(Debug, Clone)]
pub struct QuestionValidation {
    pub question: String,
    pub seed: u64,
    pub cases: usize,
    /// Everything that is wrong; empty when the question is usable.
    pub problems: Vec<String>,
}

impl QuestionValidation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// The central grading engine.
#[derive(Clone)]
pub struct GradingEngine {
    wrapper: Arc<dyn CallableWrapper>,
    extractor: Arc<dyn FeatureExtractor>,
    config: GradingConfig,
}

impl GradingEngine {
    pub fn new(
        wrapper: Arc<dyn CallableWrapper>,
        extractor: Arc<dyn FeatureExtractor>,
        config: GradingConfig,
    ) -> Self {
        Self {
            wrapper,
            extractor,
            config,
        }
    }

    /// Build the per-run state for `question`.
    ///
    /// Problems with the reference are question bugs and abort here.
    pub fn prepare(&self, question: Arc<Question>) -> Result<GradingSession, GradingError> {
        let descriptor = &question.descriptor;
        let seed = descriptor.control.seed.unwrap_or(self.config.default_seed);
        let generator = InputGenerator::new(descriptor, seed)?;

        let reference_features = self
            .extractor
            .extract_as(&question.reference.source, descriptor.question_type)
            .map_err(|e| GradingError::InvalidQuestion(format!("reference source: {e}")))?;

        let limits =
            InvocationLimits::from_control(&descriptor.control, self.config.timeout_multiplier);
        let reference = self
            .wrapper
            .wrap(
                &question.reference.implementation,
                &descriptor.signature,
                descriptor.mode,
                limits,
            )
            .map_err(|e| GradingError::InvalidQuestion(format!("reference: {e}")))?;

        tracing::debug!(
            question = %question.name(),
            seed,
            cases = generator.case_count(),
            "prepared grading session"
        );

        Ok(GradingSession {
            options: CompareOptions::from(&descriptor.control),
            question,
            reference,
            reference_features,
            generator,
            cache: ReferenceCache::new(),
            limits,
            wrapper: Arc::clone(&self.wrapper),
            extractor: Arc::clone(&self.extractor),
        })
    }

    /// Grade every submission against `question`.
    ///
    /// Verdicts come back in submission order. Only infrastructure faults
    /// (a misbehaving reference, a dead worker) abort the run.
    pub async fn grade(
        &self,
        question: Arc<Question>,
        submissions: Vec<Submission>,
        progress: &dyn ProgressReporter,
    ) -> Result<GradingReport> {
        let start = Instant::now();
        let session = Arc::new(self.prepare_blocking(Arc::clone(&question)).await?);
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let question_name = question.name().to_string();

        tracing::info!(
            question = %question_name,
            submissions = submissions.len(),
            seed = session.seed(),
            "grading started"
        );

        let mut futures = FuturesUnordered::new();
        for (position, submission) in submissions.into_iter().enumerate() {
            let session = Arc::clone(&session);
            let semaphore = Arc::clone(&semaphore);
            let question_name = question_name.clone();
            futures.push(async move {
                let id = submission.id.clone();
                let outcome: Result<Verdict, GradingError> = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| GradingError::WorkerFailed("semaphore closed".into()))?;
                    progress.on_submission_start(&question_name, &id);
                    tokio::task::spawn_blocking(move || session.grade(&submission))
                        .await
                        .map_err(|e| GradingError::WorkerFailed(e.to_string()))?
                }
                .await;
                (position, id, outcome)
            });
        }

        let mut verdicts = Vec::new();
        while let Some((position, id, outcome)) = futures.next().await {
            match outcome {
                Ok(verdict) => {
                    progress.on_verdict(&verdict);
                    verdicts.push((position, verdict));
                }
                Err(e) => {
                    tracing::error!(question = %question_name, submission = %id, "grading aborted: {e}");
                    progress.on_error(&question_name, &id, &e.to_string());
                    return Err(e.into());
                }
            }
        }
        verdicts.sort_by_key(|(position, _)| *position);
        let verdicts: Vec<Verdict> = verdicts.into_iter().map(|(_, v)| v).collect();

        let summary = GradingSummary::from_verdicts(&verdicts);
        let elapsed = start.elapsed();
        progress.on_run_complete(summary.total, summary.passed, summary.failed, elapsed);
        tracing::info!(
            question = %question_name,
            passed = summary.passed,
            failed = summary.failed,
            "grading finished"
        );

        Ok(GradingReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            question: QuestionInfo {
                name: question_name,
                version: question.descriptor.metadata.version.clone(),
                seed: session.seed(),
                cases: session.case_count(),
            },
            verdicts,
            summary,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// [`prepare`](Self::prepare) off the async executor: wrapping may block
    /// on a constructor or a worker process.
    async fn prepare_blocking(&self, question: Arc<Question>) -> Result<GradingSession, GradingError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.prepare(question))
            .await
            .map_err(|e| GradingError::WorkerFailed(e.to_string()))?
    }

    /// Check a question against its own reference and examples.
    pub async fn validate_question(&self, question: Arc<Question>) -> Result<QuestionValidation> {
        let session = self.prepare_blocking(question).await?;
        let validation = tokio::task::spawn_blocking(move || session.validate())
            .await
            .map_err(|e| GradingError::WorkerFailed(e.to_string()))??;
        Ok(validation)
    }
}

/// Shared, read-only state for grading submissions to one question.
pub struct GradingSession {
    question: Arc<Question>,
    reference: Arc<dyn Callable>,
    reference_features: FeatureSet,
    generator: InputGenerator,
    cache: ReferenceCache,
    options: CompareOptions,
    limits: InvocationLimits,
    wrapper: Arc<dyn CallableWrapper>,
    extractor: Arc<dyn FeatureExtractor>,
}

impl GradingSession {
    pub fn seed(&self) -> u64 {
        self.generator.seed()
    }

    pub fn case_count(&self) -> usize {
        self.generator.case_count()
    }

    pub fn reference_features(&self) -> &FeatureSet {
        &self.reference_features
    }

    /// Grade one submission. Submission faults become failing verdicts.
    pub fn grade(&self, submission: &Submission) -> Result<Verdict, GradingError> {
        let question = self.question.name();
        let descriptor = &self.question.descriptor;

        let features = match self
            .extractor
            .extract_as(&submission.source, descriptor.question_type)
        {
            Ok(features) => features,
            Err(e) if e.is_submission_fault() => {
                return Ok(Verdict::rejected(
                    question,
                    &submission.id,
                    Reason::ParseFailure,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let callable = match self.wrapper.wrap(
            &submission.implementation,
            &descriptor.signature,
            descriptor.mode,
            self.limits,
        ) {
            Ok(callable) => callable,
            Err(e @ GradingError::Construction(_)) => {
                return Ok(Verdict::rejected(
                    question,
                    &submission.id,
                    Reason::ConstructionFailure,
                    e.to_string(),
                ));
            }
            Err(e @ GradingError::UnsupportedShape { .. }) => {
                return Ok(Verdict::rejected(
                    question,
                    &submission.id,
                    Reason::UnsupportedShape,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let equivalence = equivalence::run(
            self.reference.as_ref(),
            callable.as_ref(),
            self.generator.cases(),
            &self.options,
            &self.cache,
        )?;
        let feature_verdict = checker::check(&self.reference_features, &features, &descriptor.features);

        let verdict = Verdict::combine(question, &submission.id, equivalence, feature_verdict);
        tracing::debug!(
            question = %question,
            submission = %submission.id,
            "{}",
            verdict.summary()
        );
        Ok(verdict)
    }

    /// The reference must honor its own policy and pass against itself,
    /// alternates must pass, and known-bad examples must fail.
    pub fn validate(&self) -> Result<QuestionValidation, GradingError> {
        let mut problems = Vec::new();

        let policy = checker::check_reference(&self.reference_features, &self.question.descriptor.features);
        problems.extend(policy_problems(&policy));
        for conflict in self.question.descriptor.features.conflicts() {
            problems.push(format!("{conflict} is both required and forbidden"));
        }

        let reference = Submission {
            id: "reference".to_string(),
            ..self.question.reference.clone()
        };
        let verdict = self.grade(&reference)?;
        if !verdict.passed {
            problems.push(format!("reference does not pass against itself: {}", verdict.summary()));
        }

        for submission in &self.question.also_correct {
            let verdict = self.grade(submission)?;
            if !verdict.passed {
                problems.push(format!(
                    "alternate solution {} fails: {}",
                    submission.id,
                    verdict.summary()
                ));
            }
        }

        for submission in &self.question.incorrect {
            let verdict = self.grade(submission)?;
            if verdict.passed {
                problems.push(format!("incorrect example {} passes", submission.id));
            }
        }

        Ok(QuestionValidation {
            question: self.question.name().to_string(),
            seed: self.seed(),
            cases: self.case_count(),
            problems,
        })
    }
}

fn policy_problems(policy: &FeatureVerdict) -> Vec<String> {
    policy
        .errors()
        .into_iter()
        .map(|error| format!("reference {error}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, FeaturePolicy};
    use crate::model::{
        ExecutionMode, Metadata, ParameterDomain, QuestionDescriptor, Signature, TestingControl,
    };
    use crate::results::{ExecutionObservation, TerminalStatus};
    use crate::traits::{Implementation, Output, Shape};
    use crate::value::{Thrown, Value, ValueType};
    use std::sync::Mutex;

    /// Runs implementations inline, without isolation.
    struct InlineWrapper;

    struct InlineCallable {
        implementation: Implementation,
    }

    impl Callable for InlineCallable {
        fn signature(&self) -> &Signature {
            &self.implementation.signature
        }

        fn mode(&self) -> ExecutionMode {
            ExecutionMode::Direct
        }

        fn invoke(&self, arguments: &[Value]) -> ExecutionObservation {
            let (output, lines) = Output::channel();
            let result = match &self.implementation.shape {
                Shape::Function(body) => body(arguments, &output),
                Shape::Method(construct) => match construct() {
                    Ok(mut receiver) => receiver.call(arguments, &output),
                    Err(e) => Err(Thrown::new(crate::value::ErrorKind::Other("Construction".into()), e)),
                },
            };
            drop(output);
            let status = match result {
                Ok(value) => TerminalStatus::Returned(value),
                Err(thrown) => TerminalStatus::Threw(thrown),
            };
            ExecutionObservation::new(status).with_output(lines.iter().collect())
        }
    }

    impl CallableWrapper for InlineWrapper {
        fn wrap(
            &self,
            implementation: &Implementation,
            expected: &Signature,
            _: ExecutionMode,
            _: InvocationLimits,
        ) -> Result<Arc<dyn Callable>, GradingError> {
            if implementation.signature != *expected {
                return Err(GradingError::UnsupportedShape {
                    expected: expected.to_string(),
                    found: implementation.signature.to_string(),
                });
            }
            Ok(Arc::new(InlineCallable {
                implementation: implementation.clone(),
            }))
        }
    }

    /// Treats each line starting with a feature key as one use of it.
    struct LineExtractor;

    impl FeatureExtractor for LineExtractor {
        fn extract(&self, source: &str) -> Result<FeatureSet, GradingError> {
            let mut set = FeatureSet::new();
            for (i, line) in source.lines().enumerate() {
                let line = line.trim();
                if line == "SYNTAX ERROR" {
                    return Err(GradingError::Parse {
                        line: i + 1,
                        message: "bad".into(),
                    });
                }
                if let Ok(feature) = line.parse::<Feature>() {
                    set.record(feature);
                }
            }
            Ok(set)
        }
    }

    fn signature() -> Signature {
        Signature::new("addTwo", vec![ValueType::Int], ValueType::Int)
    }

    fn add(n: i32) -> Implementation {
        Implementation::function(signature(), move |args, _| match args {
            [Value::Int(v)] => Ok(Value::Int(v + n)),
            _ => Err(Thrown::new(crate::value::ErrorKind::IllegalArgument, "")),
        })
    }

    fn question(policy: FeaturePolicy) -> Question {
        let descriptor = QuestionDescriptor {
            metadata: Metadata {
                name: "Add Two".into(),
                version: "2024.1.0".into(),
                ..Default::default()
            },
            question_type: Default::default(),
            signature: signature(),
            mode: ExecutionMode::Direct,
            parameters: ParameterDomain::Fixed(
                [-1, 0, 2, 100].iter().map(|n| vec![Value::Int(*n)]).collect(),
            ),
            features: policy,
            control: TestingControl::default(),
        };
        Question::new(descriptor, Submission::new("reference", "", add(2)))
    }

    fn engine() -> GradingEngine {
        GradingEngine::new(
            Arc::new(InlineWrapper),
            Arc::new(LineExtractor),
            GradingConfig::default(),
        )
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn on_submission_start(&self, _: &str, submission: &str) {
            self.events.lock().unwrap().push(format!("start {submission}"));
        }
        fn on_verdict(&self, verdict: &Verdict) {
            self.events.lock().unwrap().push(format!("verdict {}", verdict.submission));
        }
        fn on_error(&self, _: &str, submission: &str, _: &str) {
            self.events.lock().unwrap().push(format!("error {submission}"));
        }
        fn on_run_complete(&self, total: usize, _: usize, _: usize, _: Duration) {
            self.events.lock().unwrap().push(format!("complete {total}"));
        }
    }

    #[tokio::test]
    async fn grades_in_submission_order() {
        let submissions = vec![
            Submission::new("good", "", add(2)),
            Submission::new("off-by-one", "", add(1)),
            Submission::new("also-good", "", add(2)),
        ];
        let reporter = RecordingReporter::default();
        let report = engine()
            .grade(Arc::new(question(FeaturePolicy::default())), submissions, &reporter)
            .await
            .unwrap();

        let ids: Vec<_> = report.verdicts.iter().map(|v| v.submission.as_str()).collect();
        assert_eq!(ids, vec!["good", "off-by-one", "also-good"]);
        assert!(report.verdicts[0].passed);
        assert!(!report.verdicts[1].passed);
        let failure = report.verdicts[1]
            .equivalence
            .as_ref()
            .and_then(|e| e.failure.as_ref())
            .unwrap();
        assert_eq!(failure.arguments, vec![Value::Int(-1)]);
        assert_eq!(failure.expected, "1");
        assert_eq!(failure.found, "0");
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.question.cases, 4);
        assert!(reporter
            .events
            .lock()
            .unwrap()
            .contains(&"complete 3".to_string()));
    }

    #[tokio::test]
    async fn parse_failure_short_circuits() {
        let submissions = vec![Submission::new("broken", "SYNTAX ERROR", add(2))];
        let report = engine()
            .grade(Arc::new(question(FeaturePolicy::default())), submissions, &NoopReporter)
            .await
            .unwrap();
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.reason, Some(Reason::ParseFailure));
        assert!(verdict.equivalence.is_none());
    }

    #[tokio::test]
    async fn wrong_signature_is_unsupported_shape() {
        let wrong = Implementation::function(
            Signature::new("addTwo", vec![ValueType::Long], ValueType::Long),
            |_, _| Ok(Value::Long(0)),
        );
        let report = engine()
            .grade(
                Arc::new(question(FeaturePolicy::default())),
                vec![Submission::new("wrong", "", wrong)],
                &NoopReporter,
            )
            .await
            .unwrap();
        assert_eq!(report.verdicts[0].reason, Some(Reason::UnsupportedShape));
    }

    #[tokio::test]
    async fn forbidden_feature_fails_despite_equivalence() {
        let policy = FeaturePolicy {
            forbidden: [Feature::IfStatements].into_iter().collect(),
            ..Default::default()
        };
        let report = engine()
            .grade(
                Arc::new(question(policy)),
                vec![Submission::new("uses-if", "IF_STATEMENTS", add(2))],
                &NoopReporter,
            )
            .await
            .unwrap();
        let verdict = &report.verdicts[0];
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, Some(Reason::ForbiddenFeatureUsed));
        assert!(verdict.equivalence.as_ref().unwrap().passed());
    }

    #[tokio::test]
    async fn broken_reference_aborts_run() {
        let mut q = question(FeaturePolicy::default());
        q.reference.source = "SYNTAX ERROR".into();
        let err = engine()
            .grade(Arc::new(q), vec![Submission::new("s", "", add(2))], &NoopReporter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reference source"));
    }

    #[tokio::test]
    async fn verdicts_are_deterministic() {
        let q = Arc::new(question(FeaturePolicy::default()));
        let engine = engine();
        let run = || {
            engine.grade(
                Arc::clone(&q),
                vec![
                    Submission::new("a", "", add(1)),
                    Submission::new("b", "", add(2)),
                ],
                &NoopReporter,
            )
        };
        let first = run().await.unwrap();
        let second = run().await.unwrap();
        assert_eq!(
            serde_json::to_string(&first.verdicts).unwrap(),
            serde_json::to_string(&second.verdicts).unwrap()
        );
    }

    #[tokio::test]
    async fn validation_checks_examples() {
        let q = question(FeaturePolicy::default())
            .with_also_correct(Submission::new("alt", "", add(2)))
            .with_incorrect(Submission::new("bad", "", add(3)));
        let validation = engine().validate_question(Arc::new(q)).await.unwrap();
        assert!(validation.is_valid(), "{:?}", validation.problems);
        assert_eq!(validation.cases, 4);

        let q = question(FeaturePolicy::default())
            .with_also_correct(Submission::new("alt", "", add(5)))
            .with_incorrect(Submission::new("bad", "", add(2)));
        let validation = engine().validate_question(Arc::new(q)).await.unwrap();
        assert_eq!(validation.problems.len(), 2);
    }

    #[tokio::test]
    async fn validation_flags_reference_policy_violation() {
        let policy = FeaturePolicy {
            forbidden: [Feature::ForLoops].into_iter().collect(),
            ..Default::default()
        };
        let mut q = question(policy);
        q.reference.source = "FOR_LOOPS".into();
        let validation = engine().validate_question(Arc::new(q)).await.unwrap();
        assert!(validation
            .problems
            .iter()
            .any(|p| p.contains("reference uses forbidden construct: for loop")));
    }
}
