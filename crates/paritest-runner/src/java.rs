//! Java feature extraction over a tree-sitter parse tree.

use std::collections::BTreeSet;
use std::ops::Range;

use tree_sitter::{Node, Tree};

use paritest_core::error::GradingError;
use paritest_core::features::{Feature, FeatureExtractor, FeatureSet};
use paritest_core::model::QuestionType;

/// Parent kinds in which a `switch` stands as a statement.
const STATEMENT_CONTEXTS: [&str; 11] = [
    "program",
    "block",
    "switch_block_statement_group",
    "switch_rule",
    "labeled_statement",
    "if_statement",
    "while_statement",
    "for_statement",
    "enhanced_for_statement",
    "do_statement",
    "constructor_body",
];

fn java_language() -> tree_sitter::Language {
    tree_sitter_java::LANGUAGE.into()
}

/// Extracts Java constructs from a class, a method, or a bare snippet.
///
/// The source is parsed as-is first. Depending on the question type it is
/// then retried wrapped in a class, and wrapped in a class and a method. A
/// parse error is reported against the unwrapped source.
#[derive(Debug, Clone, Default)]
pub struct JavaExtractor;

impl JavaExtractor {
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, source: &str) -> Result<Tree, GradingError> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&java_language())
            .map_err(|e| GradingError::Extractor(format!("failed to load Java grammar: {e}")))?;
        parser
            .parse(source, None)
            .ok_or_else(|| GradingError::Extractor("parser returned no tree".to_string()))
    }

    fn extract_with(
        &self,
        source: &str,
        question_type: Option<QuestionType>,
    ) -> Result<FeatureSet, GradingError> {
        let rows = source.lines().count();
        let tree = self.parse(source)?;
        if !tree.root_node().has_error() {
            return Ok(collect(tree.root_node(), source, 0..rows));
        }
        let (line, message) = first_error(tree.root_node(), source);

        // Each candidate carries the number of wrapper lines before the source.
        let in_class = || (format!("class Paritest {{\n{source}\n}}\n"), 1);
        let in_method = || {
            (
                format!("class Paritest {{\nvoid paritest() {{\n{source}\n}}\n}}\n"),
                2,
            )
        };
        let fallbacks = match question_type {
            Some(QuestionType::Klass) => Vec::new(),
            Some(QuestionType::Method) => vec![in_class()],
            Some(QuestionType::Snippet) | None => vec![in_class(), in_method()],
        };

        for (candidate, prefix) in fallbacks {
            let tree = self.parse(&candidate)?;
            if !tree.root_node().has_error() {
                return Ok(collect(tree.root_node(), &candidate, prefix..prefix + rows));
            }
        }

        tracing::debug!(line, "source did not parse");
        Err(GradingError::Parse { line, message })
    }
}

impl FeatureExtractor for JavaExtractor {
    fn extract(&self, source: &str) -> Result<FeatureSet, GradingError> {
        self.extract_with(source, None)
    }

    fn extract_as(
        &self,
        source: &str,
        question_type: QuestionType,
    ) -> Result<FeatureSet, GradingError> {
        self.extract_with(source, Some(question_type))
    }
}

/// Walk the tree once, recording constructs, calls, cyclomatic complexity,
/// and the source lines within `rows` that hold code.
fn collect(root: Node<'_>, source: &str, rows: Range<usize>) -> FeatureSet {
    let mut features = FeatureSet::new();
    let mut methods: u32 = 0;
    let mut decisions: u32 = 0;
    let mut code_rows = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if is_decision(node, source) {
            decisions += 1;
        }
        if node.child_count() == 0 && !node.kind().ends_with("comment") {
            let (start, end) = (node.start_position().row, node.end_position().row);
            code_rows.extend((start..=end).filter(|row| rows.contains(row)));
        }

        match node.kind() {
            "method_declaration" | "constructor_declaration" => methods += 1,
            "if_statement" => {
                let is_else_if = node
                    .parent()
                    .and_then(|parent| parent.child_by_field_name("alternative"))
                    .is_some_and(|alternative| alternative.id() == node.id());
                if !is_else_if {
                    features.record(Feature::IfStatements);
                }
                match node.child_by_field_name("alternative") {
                    Some(alternative) if alternative.kind() == "if_statement" => {
                        features.record(Feature::ElseIf)
                    }
                    Some(_) => features.record(Feature::ElseStatements),
                    None => {}
                }
            }
            "ternary_expression" => features.record(Feature::ConditionalExpression),
            "switch_expression" | "switch_statement" => {
                let as_statement = node.kind() == "switch_statement"
                    || node
                        .parent()
                        .is_some_and(|parent| STATEMENT_CONTEXTS.contains(&parent.kind()));
                features.record(if as_statement {
                    Feature::Switch
                } else {
                    Feature::SwitchExpression
                });
            }
            "for_statement" => features.record(Feature::ForLoops),
            "enhanced_for_statement" => features.record(Feature::EnhancedFor),
            "while_statement" => features.record(Feature::WhileLoops),
            "do_statement" => features.record(Feature::DoWhileLoops),
            "assert_statement" => features.record(Feature::Assert),
            "try_statement" | "try_with_resources_statement" => {
                features.record(Feature::TryBlock)
            }
            "throw_statement" => features.record(Feature::Throw),
            "break_statement" => features.record(Feature::Break),
            "continue_statement" => features.record(Feature::Continue),
            "lambda_expression" => features.record(Feature::LambdaExpressions),
            "method_invocation" => {
                if let Some(name) = node
                    .child_by_field_name("name")
                    .and_then(|name| name.utf8_text(source.as_bytes()).ok())
                {
                    features.record_call(name);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    features.complexity = methods.max(1) + decisions;
    features.source_lines = code_rows.len() as u32;
    features
}

/// Whether `node` adds a path through its method.
fn is_decision(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "if_statement" | "ternary_expression" | "for_statement" | "enhanced_for_statement"
        | "while_statement" | "do_statement" | "catch_clause" => true,
        "switch_label" => node
            .utf8_text(source.as_bytes())
            .is_ok_and(|label| label.trim_start().starts_with("case")),
        "binary_expression" => node
            .child_by_field_name("operator")
            .is_some_and(|operator| matches!(operator.kind(), "&&" | "||")),
        _ => false,
    }
}

/// The earliest error or missing node, as a 1-based line and a message.
fn first_error(root: Node<'_>, source: &str) -> (usize, String) {
    let mut stack = vec![root];
    let mut earliest: Option<Node<'_>> = None;

    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            if earliest.map_or(true, |e| node.start_byte() < e.start_byte()) {
                earliest = Some(node);
            }
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }

    match earliest {
        Some(node) if node.is_missing() => (
            node.start_position().row + 1,
            format!("missing `{}`", node.kind()),
        ),
        Some(node) => {
            let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
            let snippet: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
            let snippet: String = snippet.chars().take(40).collect();
            (
                node.start_position().row + 1,
                format!("unexpected `{snippet}`"),
            )
        }
        None => (1, "invalid syntax".to_string()),
    }
}
