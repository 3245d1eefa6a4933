//! TOML question parser.
//!
//! Loads question descriptors from TOML files and directories, validates
//! them, and pins seeds in place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::features::FeaturePolicy;
use crate::generator::InputGenerator;
use crate::model::{
    ExecutionMode, Metadata, ParameterConstraint, ParameterDomain, QuestionDescriptor,
    QuestionType, Signature, TestingControl,
};
use crate::value::Value;

/// Intermediate TOML structure for parsing question files.
#[derive(Debug, Deserialize)]
struct TomlQuestionFile {
    question: TomlQuestionHeader,
    signature: Signature,
    #[serde(default)]
    execution: TomlExecution,
    #[serde(default)]
    parameters: TomlParameters,
    #[serde(default)]
    features: FeaturePolicy,
    #[serde(default)]
    control: TestingControl,
}

#[derive(Debug, Deserialize)]
struct TomlQuestionHeader {
    name: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    citation: Option<String>,
    #[serde(rename = "type", default = "default_question_type")]
    question_type: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    also_correct: Vec<String>,
    #[serde(default)]
    incorrect: Vec<String>,
}

fn default_question_type() -> String {
    "method".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct TomlExecution {
    #[serde(default)]
    mode: ExecutionMode,
}

#[derive(Debug, Default, Deserialize)]
struct TomlParameters {
    #[serde(default)]
    fixed: Option<Vec<Vec<toml::Value>>>,
    #[serde(default)]
    generate: Vec<ParameterConstraint>,
}

/// A parsed question file.
#[derive(Debug, Clone)]
pub struct QuestionFile {
    /// Where the descriptor was read from.
    pub path: PathBuf,
    pub descriptor: QuestionDescriptor,
    /// Reference source, resolved relative to the question file.
    pub reference: Option<PathBuf>,
    /// Sources of alternate correct solutions.
    pub also_correct: Vec<PathBuf>,
    /// Sources of known-incorrect solutions.
    pub incorrect: Vec<PathBuf>,
}

impl QuestionFile {
    /// Read the reference source, if one is declared.
    pub fn read_reference(&self) -> Result<Option<String>> {
        self.reference
            .as_deref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read reference source: {}", path.display()))
            })
            .transpose()
    }
}

/// Parse a single TOML question file.
pub fn parse_question(path: &Path) -> Result<QuestionFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question file: {}", path.display()))?;

    parse_question_str(&content, path)
}

/// Parse a TOML string into a question (useful for testing).
///
/// Relative source paths are resolved against `source_path`'s directory.
pub fn parse_question_str(content: &str, source_path: &Path) -> Result<QuestionFile> {
    let parsed: TomlQuestionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let question_type: QuestionType = parsed
        .question
        .question_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;

    let parameters = match (parsed.parameters.fixed, parsed.parameters.generate) {
        (Some(_), generate) if !generate.is_empty() => {
            anyhow::bail!(
                "{}: declare either fixed parameters or generation constraints, not both",
                source_path.display()
            );
        }
        (Some(rows), _) => ParameterDomain::Fixed(convert_fixed_rows(&rows, &parsed.signature)?),
        (None, generate) => ParameterDomain::Generate(generate),
    };

    let base = source_path.parent().unwrap_or_else(|| Path::new(""));
    let resolve = |relative: &String| base.join(relative);

    let descriptor = QuestionDescriptor {
        metadata: Metadata {
            name: parsed.question.name,
            author: parsed.question.author,
            version: parsed.question.version,
            tags: parsed.question.tags,
            citation: parsed.question.citation,
        },
        question_type,
        signature: parsed.signature,
        mode: parsed.execution.mode,
        parameters,
        features: parsed.features,
        control: parsed.control,
    };

    Ok(QuestionFile {
        path: source_path.to_path_buf(),
        reference: parsed.question.reference.as_ref().map(resolve),
        also_correct: parsed.question.also_correct.iter().map(resolve).collect(),
        incorrect: parsed.question.incorrect.iter().map(resolve).collect(),
        descriptor,
    })
}

fn convert_fixed_rows(rows: &[Vec<toml::Value>], signature: &Signature) -> Result<Vec<Vec<Value>>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| -> Result<Vec<Value>> {
            if row.len() != signature.parameters.len() {
                anyhow::bail!(
                    "fixed row {i} has {} values, {} takes {}",
                    row.len(),
                    signature.name,
                    signature.parameters.len()
                );
            }
            row.iter()
                .zip(&signature.parameters)
                .enumerate()
                .map(|(j, (raw, ty))| {
                    Value::from_toml(raw, *ty)
                        .map_err(|e| anyhow::anyhow!("fixed row {i}, parameter {j}: {e}"))
                })
                .collect()
        })
        .collect()
}

/// Recursively load all `.toml` question files from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_question_directory(dir: &Path) -> Result<Vec<QuestionFile>> {
    let mut questions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            questions.extend(load_question_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_question(&path) {
                Ok(question) => questions.push(question),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(questions)
}

/// A warning from question validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question name.
    pub question: String,
    /// Warning message.
    pub message: String,
}

/// Validate a question descriptor for common issues.
pub fn validate_descriptor(descriptor: &QuestionDescriptor) -> Vec<ValidationWarning> {
    let mut messages = Vec::new();

    if descriptor.metadata.name.trim().is_empty() {
        messages.push("name is empty".to_string());
    }
    if descriptor.metadata.version.trim().is_empty() {
        messages.push("version is missing".to_string());
    }
    if descriptor.signature.name.trim().is_empty() {
        messages.push("entry point name is empty".to_string());
    }

    match InputGenerator::new(descriptor, 0) {
        Ok(generator) => {
            if generator.case_count() == 0 {
                messages.push("no test cases would be run".to_string());
            }
            let boundaries = generator.boundary_rows().len();
            if boundaries > descriptor.control.max_test_count {
                messages.push(format!(
                    "max_test_count ({}) truncates the {boundaries} boundary cases",
                    descriptor.control.max_test_count
                ));
            }
        }
        Err(e) => messages.push(e.to_string()),
    }

    if let ParameterDomain::Fixed(rows) = &descriptor.parameters {
        let mut seen = HashSet::new();
        for (i, row) in rows.iter().enumerate() {
            let key = crate::value::format_arguments(row);
            if !seen.insert(key.clone()) {
                messages.push(format!("fixed row {i} duplicates {key}"));
            }
        }
    }

    for conflict in descriptor.features.conflicts() {
        messages.push(format!("{} is both required and forbidden", conflict.key()));
    }
    if let Some(ratio) = descriptor.features.max_source_line_ratio {
        if !(ratio.is_finite() && ratio >= 1.0) {
            messages.push(format!(
                "max_source_line_ratio must be at least 1.0, got {ratio}"
            ));
        }
    }

    if descriptor.control.timeout_ms == 0 {
        messages.push("timeout_ms is zero; every invocation will time out".to_string());
    }
    if descriptor.mode == ExecutionMode::AutoStart && !descriptor.control.check_output {
        messages.push("auto-started entry point with check_output disabled".to_string());
    }

    messages
        .into_iter()
        .map(|message| ValidationWarning {
            question: descriptor.metadata.name.clone(),
            message,
        })
        .collect()
}

/// Write `seed` into the question file's `[control]` table, keeping the
/// rest of the document as it was. Returns the previously pinned seed.
pub fn pin_seed(path: &Path, seed: u64) -> Result<Option<u64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question file: {}", path.display()))?;
    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

    if !doc.contains_key("control") {
        doc["control"] = toml_edit::table();
    }
    let control = doc["control"]
        .as_table_like_mut()
        .context("[control] is not a table")?;
    let previous = control
        .get("seed")
        .and_then(|item| item.as_integer())
        .and_then(|n| u64::try_from(n).ok());
    let value = i64::try_from(seed).context("seed does not fit in a TOML integer")?;
    control.insert("seed", toml_edit::value(value));

    std::fs::write(path, doc.to_string())
        .with_context(|| format!("failed to write question file: {}", path.display()))?;
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::value::ValueType;

    const ADD_TWO: &str = r#"
[question]
name = "Add Two"
author = "someone@example.edu"
version = "2024.1.0"
type = "method"
reference = "AddTwo.java"
also_correct = ["AddTwoAlt.java"]
tags = ["basics"]

[signature]
name = "addTwo"
parameters = ["int"]
returns = "int"

[parameters]
fixed = [[-1], [0], [2], [100]]
"#;

    const SWITCH: &str = r#"
[question]
name = "Switch Expression"
version = "2024.1.0"
type = "snippet"

[signature]
name = "determineStatus"
parameters = ["int"]
returns = "String"

[[parameters.generate]]
type = "int"
min = -5
max = 15

[features]
required = ["SWITCH_EXPRESSION"]
forbidden = ["IF_STATEMENTS", "IF_EXPRESSIONS", "SWITCH"]

[control]
seed = 124
test_count = 10
"#;

    #[test]
    fn parse_fixed_question() {
        let q = parse_question_str(ADD_TWO, Path::new("questions/add-two/question.toml")).unwrap();
        let d = &q.descriptor;
        assert_eq!(d.metadata.name, "Add Two");
        assert_eq!(d.question_type, QuestionType::Method);
        assert_eq!(d.signature.parameters, vec![ValueType::Int]);
        assert_eq!(
            d.parameters,
            ParameterDomain::Fixed(vec![
                vec![Value::Int(-1)],
                vec![Value::Int(0)],
                vec![Value::Int(2)],
                vec![Value::Int(100)],
            ])
        );
        assert_eq!(d.mode, ExecutionMode::Direct);
        assert_eq!(
            q.reference,
            Some(PathBuf::from("questions/add-two/AddTwo.java"))
        );
        assert_eq!(q.also_correct.len(), 1);
        assert!(validate_descriptor(d).is_empty());
    }

    #[test]
    fn parse_generated_question() {
        let q = parse_question_str(SWITCH, Path::new("q.toml")).unwrap();
        let d = &q.descriptor;
        assert_eq!(d.question_type, QuestionType::Snippet);
        assert_eq!(d.control.seed, Some(124));
        assert!(d.features.required.contains(&Feature::SwitchExpression));
        assert!(d.features.forbidden.contains(&Feature::ConditionalExpression));
        assert!(matches!(d.parameters, ParameterDomain::Generate(ref c) if c.len() == 1));
        assert!(q.reference.is_none());
    }

    #[test]
    fn fixed_and_generate_are_exclusive() {
        let toml = r#"
[question]
name = "Both"

[signature]
name = "f"
parameters = ["int"]
returns = "int"

[parameters]
fixed = [[1]]

[[parameters.generate]]
type = "int"
"#;
        let err = parse_question_str(toml, Path::new("q.toml")).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn fixed_rows_are_typed() {
        let toml = r#"
[question]
name = "Typed"

[signature]
name = "f"
parameters = ["String", "int[]"]
returns = "void"

[parameters]
fixed = [["a", [1, 2]], [{ null = true }, []]]
"#;
        let q = parse_question_str(toml, Path::new("q.toml")).unwrap();
        assert_eq!(
            q.descriptor.parameters,
            ParameterDomain::Fixed(vec![
                vec![Value::String("a".into()), Value::IntArray(vec![1, 2])],
                vec![Value::Null, Value::IntArray(vec![])],
            ])
        );

        let bad = toml.replace("[\"a\", [1, 2]]", "[1, [1, 2]]");
        let err = parse_question_str(&bad, Path::new("q.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("fixed row 0, parameter 0"));
    }

    #[test]
    fn unknown_question_type_is_rejected() {
        let toml = ADD_TWO.replace("type = \"method\"", "type = \"module\"");
        assert!(parse_question_str(&toml, Path::new("q.toml")).is_err());
    }

    #[test]
    fn validate_reports_problems() {
        let toml = r#"
[question]
name = "Messy"

[signature]
name = "f"
parameters = ["int"]
returns = "int"

[parameters]
fixed = [[1], [1]]

[features]
required = ["SWITCH"]
forbidden = ["SWITCH"]
max_source_line_ratio = 0.5

[control]
timeout_ms = 0
"#;
        let q = parse_question_str(toml, Path::new("q.toml")).unwrap();
        let warnings = validate_descriptor(&q.descriptor);
        let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.contains(&"version is missing"));
        assert!(messages.iter().any(|m| m.contains("duplicates (1)")));
        assert!(messages.iter().any(|m| m.contains("SWITCH is both")));
        assert!(messages.iter().any(|m| m.contains("timeout_ms is zero")));
        assert!(messages.iter().any(|m| m.contains("max_source_line_ratio")));
        assert!(warnings.iter().all(|w| w.question == "Messy"));
    }

    #[test]
    fn validate_reports_constraint_mismatch() {
        let toml = SWITCH.replace("type = \"int\"\nmin = -5\nmax = 15", "type = \"boolean\"");
        let q = parse_question_str(&toml, Path::new("q.toml")).unwrap();
        let warnings = validate_descriptor(&q.descriptor);
        assert!(warnings.iter().any(|w| w.message.contains("parameter 0 is int")));
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("add.toml"), ADD_TWO).unwrap();
        std::fs::write(nested.join("switch.toml"), SWITCH).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not = [valid").unwrap();
        std::fs::write(dir.path().join("README.md"), "# ignored").unwrap();

        let questions = load_question_directory(dir.path()).unwrap();
        let names: Vec<_> = questions
            .iter()
            .map(|q| q.descriptor.metadata.name.as_str())
            .collect();
        assert_eq!(names, vec!["Add Two", "Switch Expression"]);
    }

    #[test]
    fn load_directory_requires_directory() {
        assert!(load_question_directory(Path::new("/nonexistent/dir")).is_err());
    }

    #[test]
    fn pin_seed_preserves_formatting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switch.toml");
        std::fs::write(&path, SWITCH).unwrap();

        let previous = pin_seed(&path, 9001).unwrap();
        assert_eq!(previous, Some(124));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("seed = 9001"));
        assert!(content.contains("forbidden = [\"IF_STATEMENTS\", \"IF_EXPRESSIONS\", \"SWITCH\"]"));
        let q = parse_question(&path).unwrap();
        assert_eq!(q.descriptor.control.seed, Some(9001));
    }

    #[test]
    fn pin_seed_creates_control_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("add.toml");
        std::fs::write(&path, ADD_TWO).unwrap();
        assert_eq!(pin_seed(&path, 7).unwrap(), None);
        let q = parse_question(&path).unwrap();
        assert_eq!(q.descriptor.control.seed, Some(7));
        assert_eq!(q.descriptor.control.test_count, 64);
    }

    #[test]
    fn read_reference_resolves_relative_to_question() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.toml");
        std::fs::write(&path, ADD_TWO).unwrap();
        std::fs::write(dir.path().join("AddTwo.java"), "int addTwo(int v) { return v + 2; }")
            .unwrap();
        let q = parse_question(&path).unwrap();
        let source = q.read_reference().unwrap().unwrap();
        assert!(source.contains("addTwo"));
    }
}
