//! Reductions, including the sequence-argument `add_n`.

use super::elementwise::{unbroadcast, zip_num};
use super::{expect_args, type_mismatch};
use crate::error::TensorError;
use crate::operations;
use crate::tensor::Tensor;
use crate::value::Value;

type Grads = Result<Vec<Option<Value>>, TensorError>;

fn upstream(op: &str, g: &Value) -> Result<f64, TensorError> {
    g.to_f64().ok_or_else(|| type_mismatch(op, "scalar gradient", g))
}

pub(super) fn sum(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("sum", args, 1)?;
    match &args[0] {
        Value::Scalar(x) => Ok(Value::Scalar(*x)),
        Value::Tensor(t) => Ok(Value::Scalar(operations::sum(t))),
        other => Err(type_mismatch("sum", "scalar or tensor", other)),
    }
}

pub(super) fn sum_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let g = upstream("sum", g)?;
    let grad = match &args[0] {
        Value::Tensor(t) => Value::Tensor(Tensor::full(t.shape(), g)),
        _ => Value::Scalar(g),
    };
    Ok(vec![Some(grad)])
}

pub(super) fn mean(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("mean", args, 1)?;
    match &args[0] {
        Value::Scalar(x) => Ok(Value::Scalar(*x)),
        Value::Tensor(t) => Ok(Value::Scalar(operations::mean(t))),
        other => Err(type_mismatch("mean", "scalar or tensor", other)),
    }
}

pub(super) fn mean_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let g = upstream("mean", g)?;
    let grad = match &args[0] {
        Value::Tensor(t) => Value::Tensor(Tensor::full(t.shape(), g / t.len().max(1) as f64)),
        _ => Value::Scalar(g),
    };
    Ok(vec![Some(grad)])
}

/// Sum of the elements of a single sequence argument.
pub(super) fn add_n(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("add_n", args, 1)?;
    let items = match &args[0] {
        Value::Seq(items) if !items.is_empty() => items,
        Value::Seq(_) => {
            return Err(TensorError::InvalidOperation(
                "add_n of an empty sequence".to_string(),
            ));
        }
        other => return Err(type_mismatch("add_n", "sequence", other)),
    };
    items[1..]
        .iter()
        .try_fold(items[0].clone(), |acc, x| zip_num("add_n", &acc, x, |a, b| a + b))
}

pub(super) fn add_n_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let parts = match &args[0] {
        Value::Seq(items) => items.iter().map(|x| unbroadcast(g.clone(), x)).collect(),
        other => return Err(type_mismatch("add_n", "sequence", other)),
    };
    Ok(vec![Some(Value::Seq(parts))])
}
