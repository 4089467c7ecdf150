//! Runtime data model shared by the loader and the interpreter.

use std::fmt;
use std::path::PathBuf;

use crate::processor::ast::ScalarType;

/// One script as read from disk.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub path: PathBuf,
    pub text: String,
}

/// A scalar or batch value held by the interpreter environment.
///
/// Image handles are stored beside values (see `Environment`), never inside
/// them, so a `Value` is always cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    /// Resolved directory paths, in declaration order.
    Batch(Vec<PathBuf>),
}

/// Runtime type tag of an environment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Double,
    Str,
    Bool,
    Batch,
    Image,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Int => "Int",
            ValueType::Double => "Double",
            ValueType::Str => "String",
            ValueType::Bool => "Bool",
            ValueType::Batch => "Batch",
            ValueType::Image => "Image",
        })
    }
}

impl Value {
    /// Zero value of a declaration without initializer.
    pub fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Int | ScalarType::Pixels => Value::Int(0),
            ScalarType::Double => Value::Double(0.0),
            ScalarType::Str => Value::Str(String::new()),
            ScalarType::Bool => Value::Bool(false),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Str(_) => ValueType::Str,
            Value::Bool(_) => ValueType::Bool,
            Value::Batch(_) => ValueType::Batch,
        }
    }

    /// Numeric view of the value: ints, doubles and strings that parse as a
    /// double.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Bool(_) | Value::Batch(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Batch(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Batch(paths) => {
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
        }
    }
}
