//! Regression detection integration tests.
//!
//! Exercises the report comparison workflow: JSON persistence, reloading,
//! and classification of verdict changes between grading runs.

use paritest_core::report::{GradingReport, GradingSummary, QuestionInfo};
use paritest_core::results::*;
use paritest_core::value::Value;
use uuid::Uuid;

fn passed(submission: &str) -> Verdict {
    Verdict::combine(
        "Add Two",
        submission,
        EquivalenceVerdict {
            cases_run: 4,
            failure: None,
        },
        FeatureVerdict::default(),
    )
}

fn mismatch(submission: &str, found: i32) -> Verdict {
    Verdict::combine(
        "Add Two",
        submission,
        EquivalenceVerdict {
            cases_run: 1,
            failure: Some(CaseFailure {
                reason: Reason::ValueMismatch,
                index: 0,
                arguments: vec![Value::Int(-1)],
                expected: "1".into(),
                found: found.to_string(),
                expected_output: vec![],
                found_output: vec![],
            }),
        },
        FeatureVerdict::default(),
    )
}

fn make_report(seed: u64, verdicts: Vec<Verdict>) -> GradingReport {
    GradingReport {
        id: Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        question: QuestionInfo {
            name: "Add Two".into(),
            version: "2024.1.0".into(),
            seed,
            cases: 4,
        },
        summary: GradingSummary::from_verdicts(&verdicts),
        verdicts,
        duration_ms: 40,
    }
}

#[test]
fn detect_regression_when_submission_starts_failing() {
    let baseline = make_report(124, vec![passed("alice"), passed("bob")]);
    let current = make_report(124, vec![mismatch("alice", 0), passed("bob")]);

    let diff = current.compare(&baseline);

    assert!(diff.has_changes());
    assert_eq!(diff.regressions.len(), 1);
    assert_eq!(diff.regressions[0].submission, "alice");
    assert!(diff.regressions[0].current.contains("value mismatch"));
    assert_eq!(diff.unchanged, 1);
    assert!(!diff.seed_changed);
}

#[test]
fn detect_improvement() {
    let baseline = make_report(124, vec![mismatch("alice", 0)]);
    let current = make_report(124, vec![passed("alice")]);

    let diff = current.compare(&baseline);

    assert!(diff.regressions.is_empty());
    assert_eq!(diff.improvements.len(), 1);
}

#[test]
fn different_failure_details_are_changes() {
    let baseline = make_report(124, vec![mismatch("alice", 0)]);
    let current = make_report(7, vec![mismatch("alice", 5)]);

    let diff = current.compare(&baseline);

    assert_eq!(diff.changed.len(), 1);
    assert!(diff.seed_changed);
    assert!(diff.to_markdown().contains("different seeds"));
}

#[test]
fn detect_new_and_removed_submissions() {
    let baseline = make_report(124, vec![passed("old"), passed("shared")]);
    let current = make_report(124, vec![passed("shared"), passed("new")]);

    let diff = current.compare(&baseline);

    assert_eq!(diff.new_submissions, 1);
    assert_eq!(diff.removed_submissions, 1);
    assert!(!diff.has_changes());
}

#[test]
fn json_roundtrip_preserves_verdicts() {
    let report = make_report(124, vec![passed("alice"), mismatch("bob", 0)]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("add-two.json");

    report.save_json(&path).unwrap();
    let loaded = GradingReport::load_json(&path).unwrap();

    assert_eq!(loaded.id, report.id);
    assert_eq!(loaded.verdicts, report.verdicts);
    assert_eq!(loaded.summary.passed, 1);
    assert_eq!(loaded.summary.by_reason[&Reason::ValueMismatch], 1);
    assert!(!loaded.compare(&report).has_changes());
}

#[test]
fn markdown_lists_regressions() {
    let baseline = make_report(124, vec![passed("alice")]);
    let current = make_report(124, vec![mismatch("alice", 0)]);

    let md = current.compare(&baseline).to_markdown();

    assert!(md.contains("### Regressions"));
    assert!(md.contains("alice"));
    assert!(md.contains("1 regressions"));
}
