//! Grading report types with JSON persistence and verdict diffing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::results::{Reason, Verdict};

/// A complete grading report for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub question: QuestionInfo,
    /// One verdict per submission, in submission order.
    pub verdicts: Vec<Verdict>,
    pub summary: GradingSummary,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// What was graded, and under which seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub seed: u64,
    pub cases: usize,
}

/// Pass/fail counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failures per primary reason.
    #[serde(default)]
    pub by_reason: BTreeMap<Reason, usize>,
}

impl GradingSummary {
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let mut summary = GradingSummary {
            total: verdicts.len(),
            ..Default::default()
        };
        for verdict in verdicts {
            if verdict.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
                if let Some(reason) = verdict.reason {
                    *summary.by_reason.entry(reason).or_insert(0) += 1;
                }
            }
        }
        summary
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl GradingReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Name under which [`save_in`](Self::save_in) stores this report.
    pub fn file_name(&self) -> String {
        let id = self.id.simple().to_string();
        format!(
            "report-{}-{}.json",
            self.created_at.format("%Y%m%d-%H%M%S"),
            &id[..8]
        )
    }

    /// Save the report into an output directory, returning the file written.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        self.save_json(&path)?;
        Ok(path)
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: GradingReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare this report's verdicts against a baseline.
    ///
    /// Re-grading the same submissions with the same seed must produce an
    /// empty diff.
    pub fn compare(&self, baseline: &GradingReport) -> VerdictDiff {
        let index = |report: &GradingReport| -> HashMap<(String, String), Verdict> {
            report
                .verdicts
                .iter()
                .map(|v| ((v.question.clone(), v.submission.clone()), v.clone()))
                .collect()
        };
        let baseline_verdicts = index(baseline);
        let current_verdicts = index(self);

        let mut diff = VerdictDiff {
            seed_changed: self.question.seed != baseline.question.seed,
            ..Default::default()
        };

        for verdict in &self.verdicts {
            let key = (verdict.question.clone(), verdict.submission.clone());
            let Some(before) = baseline_verdicts.get(&key) else {
                diff.new_submissions += 1;
                continue;
            };
            if before == verdict {
                diff.unchanged += 1;
                continue;
            }
            let change = VerdictChange {
                question: verdict.question.clone(),
                submission: verdict.submission.clone(),
                baseline: before.summary(),
                current: verdict.summary(),
            };
            match (before.passed, verdict.passed) {
                (true, false) => diff.regressions.push(change),
                (false, true) => diff.improvements.push(change),
                _ => diff.changed.push(change),
            }
        }

        diff.removed_submissions = baseline_verdicts
            .keys()
            .filter(|k| !current_verdicts.contains_key(*k))
            .count();
        diff
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerdictDiff {
    /// Submissions that passed before and fail now.
    pub regressions: Vec<VerdictChange>,
    /// Submissions that failed before and pass now.
    pub improvements: Vec<VerdictChange>,
    /// Same pass/fail, different details.
    pub changed: Vec<VerdictChange>,
    pub unchanged: usize,
    pub new_submissions: usize,
    pub removed_submissions: usize,
    pub seed_changed: bool,
}

/// One submission whose verdict differs between reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictChange {
    pub question: String,
    pub submission: String,
    pub baseline: String,
    pub current: String,
}

impl VerdictDiff {
    pub fn has_changes(&self) -> bool {
        !self.regressions.is_empty() || !self.improvements.is_empty() || !self.changed.is_empty()
    }

    /// Format the diff as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} changed, {} unchanged\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.changed.len(),
            self.unchanged
        ));
        if self.seed_changed {
            md.push_str("_Reports were graded with different seeds._\n\n");
        }

        for (title, changes) in [
            ("Regressions", &self.regressions),
            ("Improvements", &self.improvements),
            ("Changed", &self.changed),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Question | Submission | Baseline | Current |\n");
            md.push_str("|----------|------------|----------|---------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    c.question, c.submission, c.baseline, c.current
                ));
            }
            md.push('\n');
        }

        if self.new_submissions > 0 || self.removed_submissions > 0 {
            md.push_str(&format!(
                "{} new, {} removed submissions\n",
                self.new_submissions, self.removed_submissions
            ));
        }

        md
    }
}
