//! The `paritest pin-seed` command.

use std::path::PathBuf;

use anyhow::Result;

use paritest_core::parser;

pub fn execute(question_path: PathBuf, seed: u64) -> Result<()> {
    // Refuse to touch files that are not valid questions.
    parser::parse_question(&question_path)?;

    match parser::pin_seed(&question_path, seed)? {
        Some(previous) if previous == seed => {
            println!("Seed {seed} already pinned in {}", question_path.display());
        }
        Some(previous) => {
            tracing::info!(previous, seed, "replacing pinned seed");
            println!("Pinned seed {seed} in {} (was {previous})", question_path.display());
        }
        None => println!("Pinned seed {seed} in {}", question_path.display()),
    }

    Ok(())
}
