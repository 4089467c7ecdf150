//! Expression evaluation.
//!
//! Scalar context: `+` concatenates as soon as either side is a string,
//! otherwise both sides are coerced to numbers (ints, doubles and strings
//! that parse as a double). Int-only arithmetic stays integral. Values that
//! are not numeric only support `==` and `!=`.
//!
//! Batch context: every term becomes a list of paths and the lists are
//! appended in order.

use std::fs;
use std::path::PathBuf;

use snafu::ResultExt;

use super::ast::{BinaryOp, Expr, Literal, MetadataKind};
use super::environment::Environment;
use crate::engine::ImageEngine;
use crate::error::{
    DivisionByZeroSnafu, InvalidBatchTermSnafu, IoSnafu, RuntimeError, TypeMismatchSnafu,
};
use crate::model::{Value, ValueType};

pub fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) | Literal::Pixels(i) => Value::Int(*i),
        Literal::Double(d) => Value::Double(*d),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

pub fn evaluate<E: ImageEngine>(
    expr: &Expr,
    env: &Environment<E::Image>,
    engine: &E,
) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Variable(name) => env.value(name).cloned(),
        Expr::Metadata { image, kind } => {
            let handle = env.image(image)?;
            let value = match kind {
                MetadataKind::Width => Value::Int(i64::from(engine.dimensions(&handle.image).0)),
                MetadataKind::Height => Value::Int(i64::from(engine.dimensions(&handle.image).1)),
                MetadataKind::FileName => Value::Str(handle.stem().to_string()),
                MetadataKind::FileSize => {
                    let meta = fs::metadata(&handle.source).context(IoSnafu {
                        path: handle.source.clone(),
                    })?;
                    Value::Double(meta.len() as f64 / 1024.0)
                }
            };
            Ok(value)
        }
        Expr::Binary { left, op, right } => {
            let l = evaluate(left, env, engine)?;
            let r = evaluate(right, env, engine)?;
            binary(*op, l, r)
        }
        Expr::Batch(_) => evaluate_batch(expr, env).map(Value::Batch),
    }
}

/// Evaluate the right-hand side of a `BATCH` declaration to its raw
/// (unresolved) path list.
pub fn evaluate_batch<I>(expr: &Expr, env: &Environment<I>) -> Result<Vec<PathBuf>, RuntimeError> {
    match expr {
        Expr::Batch(terms) => {
            let mut paths = Vec::new();
            for term in terms {
                paths.extend(evaluate_batch(term, env)?);
            }
            Ok(paths)
        }
        Expr::Literal(Literal::Str(path)) => Ok(vec![PathBuf::from(path)]),
        Expr::Variable(name) => Ok(env.batch(name)?.to_vec()),
        Expr::Binary {
            left,
            op: BinaryOp::Add,
            right,
        } => {
            let mut paths = evaluate_batch(left, env)?;
            paths.extend(evaluate_batch(right, env)?);
            Ok(paths)
        }
        Expr::Literal(lit) => InvalidBatchTermSnafu {
            found: literal_value(lit).value_type(),
        }
        .fail(),
        Expr::Metadata { .. } | Expr::Binary { .. } => InvalidBatchTermSnafu {
            found: ValueType::Int,
        }
        .fail(),
    }
}

pub fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    if op == BinaryOp::Add && (matches!(l, Value::Str(_)) || matches!(r, Value::Str(_))) {
        return Ok(Value::Str(format!("{l}{r}")));
    }

    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        return int_binary(op, *a, *b);
    }

    if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
        let value = match op {
            BinaryOp::Add => Value::Double(a + b),
            BinaryOp::Sub => Value::Double(a - b),
            BinaryOp::Mul => Value::Double(a * b),
            BinaryOp::Div => Value::Double(a / b),
            BinaryOp::Eq => Value::Bool(a == b),
            BinaryOp::Ne => Value::Bool(a != b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Ge => Value::Bool(a >= b),
        };
        return Ok(value);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::Ne => Ok(Value::Bool(l != r)),
        _ => TypeMismatchSnafu {
            op,
            left: l.value_type(),
            right: r.value_type(),
        }
        .fail(),
    }
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let value = match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinaryOp::Div => {
            if b == 0 {
                return DivisionByZeroSnafu.fail();
            }
            Value::Int(a.wrapping_div(b))
        }
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
    };
    Ok(value)
}
