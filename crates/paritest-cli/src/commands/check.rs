//! The `paritest check` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use paritest_core::checker;
use paritest_core::features::FeatureExtractor;
use paritest_core::parser;
use paritest_runner::java::JavaExtractor;

pub fn execute(question_path: PathBuf, submission_path: PathBuf) -> Result<()> {
    let question = parser::parse_question(&question_path)?;
    let descriptor = &question.descriptor;
    let reference = question
        .read_reference()?
        .context("question declares no reference source")?;
    let submission = std::fs::read_to_string(&submission_path)
        .with_context(|| format!("failed to read submission: {}", submission_path.display()))?;

    let extractor = JavaExtractor::new();
    let reference = extractor
        .extract_as(&reference, descriptor.question_type)
        .context("reference source does not parse")?;

    let name = &descriptor.metadata.name;
    let features = match extractor.extract_as(&submission, descriptor.question_type) {
        Ok(features) => features,
        Err(e) if e.is_submission_fault() => {
            println!("{name}: failed (parse failure)");
            println!("  - {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let verdict = checker::check(&reference, &features, &descriptor.features);
    match verdict.reason() {
        None => {
            println!("{name}: feature check passed");
            Ok(())
        }
        Some(reason) => {
            println!("{name}: failed ({reason})");
            for error in verdict.errors() {
                println!("  - {error}");
            }
            std::process::exit(1);
        }
    }
}
