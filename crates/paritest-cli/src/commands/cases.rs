//! The `paritest cases` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use paritest_core::config::load_config_from;
use paritest_core::generator::{InputGenerator, TestCase};
use paritest_core::parser;
use paritest_core::value::format_arguments;

pub fn execute(
    question_path: PathBuf,
    seed: Option<u64>,
    limit: Option<usize>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let question = parser::parse_question(&question_path)?;
    let descriptor = &question.descriptor;

    let seed = seed
        .or(descriptor.control.seed)
        .unwrap_or(config.default_seed);
    let generator = InputGenerator::new(descriptor, seed)?;
    let cases: Vec<TestCase> = generator
        .cases()
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(());
    }

    println!(
        "Question: {} ({}, seed {seed}, {} cases)",
        descriptor.metadata.name,
        descriptor.signature,
        generator.case_count()
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Origin", "Arguments"]);
    for case in &cases {
        table.add_row(vec![
            Cell::new(case.index),
            Cell::new(case.origin),
            Cell::new(format_arguments(&case.arguments)),
        ]);
    }
    println!("{table}");

    Ok(())
}
