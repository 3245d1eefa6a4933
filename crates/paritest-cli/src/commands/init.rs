//! The `paritest init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("paritest.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("questions/add-two")?;
    write_if_missing(Path::new("questions/add-two/question.toml"), EXAMPLE_QUESTION)?;
    write_if_missing(Path::new("questions/add-two/AddTwo.java"), EXAMPLE_REFERENCE)?;

    println!("\nNext steps:");
    println!("  1. Run: paritest validate --questions questions");
    println!("  2. Run: paritest cases --question questions/add-two/question.toml");
    println!("  3. Run: paritest check --question questions/add-two/question.toml --submission <file>");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# paritest configuration

parallelism = 4
default_seed = 124
timeout_multiplier = 1.0
# saved reports; `compare` also looks here
output_dir = "./paritest-results"
"#;

const EXAMPLE_QUESTION: &str = r#"[question]
name = "Add Two"
author = "someone@example.edu"
version = "2024.1.0"
type = "method"
reference = "AddTwo.java"
tags = ["basics"]

[signature]
name = "addTwo"
parameters = ["int"]
returns = "int"

[parameters]
fixed = [[-1], [0], [2], [100]]

[features]
forbidden = ["IF_STATEMENTS", "TERNARY_OPERATOR"]
max_extra_complexity = 2

[control]
timeout_ms = 1000
"#;

const EXAMPLE_REFERENCE: &str = r#"int addTwo(int value) {
    return value + 2;
}
"#;
