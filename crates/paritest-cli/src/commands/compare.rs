//! The `paritest compare` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use paritest_core::config::load_config_from;
use paritest_core::report::GradingReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    format: String,
    fail_on_change: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let baseline = GradingReport::load_json(&locate(&baseline_path, &config.output_dir))?;
    let current = GradingReport::load_json(&locate(&current_path, &config.output_dir))?;

    let diff = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", diff.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        _ => {
            println!(
                "Comparison: {} regressions, {} improvements, {} changed, {} unchanged",
                diff.regressions.len(),
                diff.improvements.len(),
                diff.changed.len(),
                diff.unchanged
            );
            if diff.seed_changed {
                println!(
                    "Seeds differ: {} -> {}",
                    baseline.question.seed, current.question.seed
                );
            }

            for (title, changes) in [
                ("Regressions", &diff.regressions),
                ("Improvements", &diff.improvements),
                ("Changed", &diff.changed),
            ] {
                if changes.is_empty() {
                    continue;
                }
                println!("\n{title}:");
                for c in changes {
                    println!("  {} :: {}", c.question, c.submission);
                    println!("    before: {}", c.baseline);
                    println!("    after:  {}", c.current);
                }
            }

            if diff.new_submissions > 0 {
                println!("\n{} new submission(s)", diff.new_submissions);
            }
            if diff.removed_submissions > 0 {
                println!("{} removed submission(s)", diff.removed_submissions);
            }
        }
    }

    if fail_on_change && diff.has_changes() {
        std::process::exit(1);
    }

    Ok(())
}

/// A report path as given, or else relative to the output directory.
fn locate(path: &Path, output_dir: &Path) -> PathBuf {
    if path.exists() || path.is_absolute() {
        return path.to_path_buf();
    }
    let saved = output_dir.join(path);
    if saved.exists() {
        saved
    } else {
        path.to_path_buf()
    }
}
