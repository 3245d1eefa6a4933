//! The `paritest validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use paritest_core::checker;
use paritest_core::config::load_config_from;
use paritest_core::features::FeatureExtractor;
use paritest_core::generator::InputGenerator;
use paritest_core::parser::{self, QuestionFile};
use paritest_runner::java::JavaExtractor;

pub fn execute(questions_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let questions = if questions_path.is_dir() {
        parser::load_question_directory(&questions_path)?
    } else {
        vec![parser::parse_question(&questions_path)?]
    };

    let extractor = JavaExtractor::new();
    let mut total_warnings = 0;

    for question in &questions {
        let descriptor = &question.descriptor;
        let seed = descriptor.control.seed.unwrap_or(config.default_seed);
        let cases = InputGenerator::new(descriptor, seed)
            .map(|g| g.case_count())
            .unwrap_or(0);
        println!(
            "Question: {} ({} cases, seed {seed})",
            descriptor.metadata.name, cases
        );

        let mut messages: Vec<String> = parser::validate_descriptor(descriptor)
            .into_iter()
            .map(|w| w.message)
            .collect();
        messages.extend(source_problems(question, &extractor)?);

        for message in &messages {
            println!("  WARNING: {message}");
        }
        total_warnings += messages.len();
    }

    if total_warnings == 0 {
        println!("All questions valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

/// Static checks on the sources a question points at.
fn source_problems(question: &QuestionFile, extractor: &JavaExtractor) -> Result<Vec<String>> {
    let descriptor = &question.descriptor;
    let policy = &descriptor.features;
    let mut problems = Vec::new();

    let Some(reference) = question.read_reference()? else {
        problems.push("no reference source declared".to_string());
        return Ok(problems);
    };
    let reference = match extractor.extract_as(&reference, descriptor.question_type) {
        Ok(features) => features,
        Err(e) => {
            problems.push(format!("reference source: {e}"));
            return Ok(problems);
        }
    };
    for error in checker::check_reference(&reference, policy).errors() {
        problems.push(format!("reference {error}"));
    }

    for path in &question.also_correct {
        let source = read_source(path)?;
        match extractor.extract_as(&source, descriptor.question_type) {
            Ok(features) => {
                for error in checker::check(&reference, &features, policy).errors() {
                    problems.push(format!("{}: {error}", path.display()));
                }
            }
            Err(e) => problems.push(format!("{}: {e}", path.display())),
        }
    }
    for path in &question.incorrect {
        if !path.exists() {
            problems.push(format!("{}: incorrect example not found", path.display()));
        }
    }

    Ok(problems)
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read source: {}", path.display()))
}
