//! The `paritest features` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use paritest_core::features::FeatureExtractor;
use paritest_core::model::QuestionType;
use paritest_runner::java::JavaExtractor;

pub fn execute(source_path: PathBuf, question_type: Option<QuestionType>, format: String) -> Result<()> {
    let source = std::fs::read_to_string(&source_path)
        .with_context(|| format!("failed to read source: {}", source_path.display()))?;

    let extractor = JavaExtractor::new();
    let features = match question_type {
        Some(question_type) => extractor.extract_as(&source, question_type),
        None => extractor.extract(&source),
    }
    .with_context(|| format!("failed to analyze {}", source_path.display()))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&features)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Construct", "Key", "Count"]);
    for feature in features.present() {
        table.add_row(vec![
            Cell::new(feature),
            Cell::new(feature.key()),
            Cell::new(features.count(feature)),
        ]);
    }
    println!("{table}");
    println!(
        "Complexity: {}, source lines: {}",
        features.complexity, features.source_lines
    );

    if !features.method_calls.is_empty() {
        let calls: Vec<&str> = features.method_calls.iter().map(String::as_str).collect();
        println!("Method calls: {}", calls.join(", "));
    }

    Ok(())
}
