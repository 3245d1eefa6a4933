//! Dynamic values passed to and returned from graded implementations.
//!
//! Both the reference and every submission speak this one value model, so
//! arguments can be cloned per invocation and results compared structurally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A runtime value crossing the callable boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Char(char),
    String(String),
    IntArray(Vec<i32>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a TOML literal into a value of the declared type.
    ///
    /// `{ null = true }` is the null literal for reference types.
    pub fn from_toml(raw: &toml::Value, ty: ValueType) -> Result<Value, String> {
        if is_toml_null(raw) {
            return if ty.accepts(&Value::Null) {
                Ok(Value::Null)
            } else {
                Err(format!("null is not a valid {ty}"))
            };
        }

        match (ty, raw) {
            (ValueType::Int, toml::Value::Integer(n)) => i32::try_from(*n)
                .map(Value::Int)
                .map_err(|_| format!("{n} does not fit in an int")),
            (ValueType::Long, toml::Value::Integer(n)) => Ok(Value::Long(*n)),
            (ValueType::Double, toml::Value::Float(x)) => Ok(Value::Double(*x)),
            (ValueType::Double, toml::Value::Integer(n)) => Ok(Value::Double(*n as f64)),
            (ValueType::Boolean, toml::Value::Boolean(b)) => Ok(Value::Boolean(*b)),
            (ValueType::Char, toml::Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(format!("{s:?} is not a single char")),
                }
            }
            (ValueType::String, toml::Value::String(s)) => Ok(Value::String(s.clone())),
            (ValueType::IntArray, toml::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    toml::Value::Integer(n) => {
                        i32::try_from(*n).map_err(|_| format!("{n} does not fit in an int"))
                    }
                    other => Err(format!("int[] element must be an integer, got {other}")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::IntArray),
            (ValueType::List, toml::Value::Array(items)) => items
                .iter()
                .map(untyped_from_toml)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (ty, other) => Err(format!("expected {ty}, got {other}")),
        }
    }
}

fn is_toml_null(raw: &toml::Value) -> bool {
    raw.as_table()
        .and_then(|t| t.get("null"))
        .and_then(toml::Value::as_bool)
        .unwrap_or(false)
}

fn untyped_from_toml(raw: &toml::Value) -> Result<Value, String> {
    if is_toml_null(raw) {
        return Ok(Value::Null);
    }
    match raw {
        toml::Value::Integer(n) => Ok(i32::try_from(*n)
            .map(Value::Int)
            .unwrap_or(Value::Long(*n))),
        toml::Value::Float(x) => Ok(Value::Double(*x)),
        toml::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        toml::Value::String(s) => Ok(Value::String(s.clone())),
        toml::Value::Array(items) => items
            .iter()
            .map(untyped_from_toml)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => Err(format!("unsupported list element: {other}")),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            // Bitwise, like Java's `Double.equals`: every NaN is equal and
            // 0.0 differs from -0.0.
            (Value::Double(a), Value::Double(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::IntArray(a), Value::IntArray(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}L"),
            Value::Double(x) if x.is_infinite() => {
                write!(f, "{}Infinity", if *x < 0.0 { "-" } else { "" })
            }
            Value::Double(x) => write!(f, "{x:?}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::IntArray(items) => {
                write!(f, "[")?;
                for (i, n) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}")?;
                }
                write!(f, "]")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Render an argument tuple the way a call site would look.
pub fn format_arguments(arguments: &[Value]) -> String {
    let parts: Vec<String> = arguments.iter().map(Value::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Declared parameter and return types, named as in Java source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "String", alias = "string")]
    String,
    #[serde(rename = "int[]")]
    IntArray,
    #[serde(rename = "List", alias = "list")]
    List,
}

impl ValueType {
    /// Whether `value` is a legal instance of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Void, Value::Null) => true,
            (ValueType::String | ValueType::IntArray | ValueType::List, Value::Null) => true,
            (ValueType::Boolean, Value::Boolean(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Long, Value::Long(_)) => true,
            (ValueType::Double, Value::Double(_)) => true,
            (ValueType::Char, Value::Char(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::IntArray, Value::IntArray(_)) => true,
            (ValueType::List, Value::List(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Void => "void",
            ValueType::Boolean => "boolean",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Char => "char",
            ValueType::String => "String",
            ValueType::IntArray => "int[]",
            ValueType::List => "List",
        };
        f.write_str(name)
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "void" => Ok(ValueType::Void),
            "boolean" => Ok(ValueType::Boolean),
            "int" => Ok(ValueType::Int),
            "long" => Ok(ValueType::Long),
            "double" => Ok(ValueType::Double),
            "char" => Ok(ValueType::Char),
            "String" | "string" => Ok(ValueType::String),
            "int[]" => Ok(ValueType::IntArray),
            "List" | "list" => Ok(ValueType::List),
            other => Err(format!("unknown type: {other}")),
        }
    }
}

/// The kind of error an implementation raised.
///
/// Two raised errors are equivalent when their kinds match; messages are
/// informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Assertion,
    IllegalArgument,
    IllegalState,
    NullPointer,
    Arithmetic,
    IndexOutOfBounds,
    Other(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Assertion => write!(f, "AssertionError"),
            ErrorKind::IllegalArgument => write!(f, "IllegalArgumentException"),
            ErrorKind::IllegalState => write!(f, "IllegalStateException"),
            ErrorKind::NullPointer => write!(f, "NullPointerException"),
            ErrorKind::Arithmetic => write!(f, "ArithmeticException"),
            ErrorKind::IndexOutOfBounds => write!(f, "IndexOutOfBoundsException"),
            ErrorKind::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ErrorKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "assertion" | "AssertionError" => ErrorKind::Assertion,
            "illegal_argument" | "IllegalArgumentException" => ErrorKind::IllegalArgument,
            "illegal_state" | "IllegalStateException" => ErrorKind::IllegalState,
            "null_pointer" | "NullPointerException" => ErrorKind::NullPointer,
            "arithmetic" | "ArithmeticException" => ErrorKind::Arithmetic,
            "index_out_of_bounds" | "IndexOutOfBoundsException" => ErrorKind::IndexOutOfBounds,
            other => ErrorKind::Other(other.to_string()),
        })
    }
}

/// An error raised by an implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thrown {
    pub kind: ErrorKind,
    #[serde(default)]
    pub message: String,
}

impl Thrown {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}
