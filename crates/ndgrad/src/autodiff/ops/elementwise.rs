//! Element-wise primitives.
//!
//! Binary operations accept any mix of scalars and tensors. A scalar
//! operand is broadcast against a tensor, and its gradient is the sum of
//! the broadcast gradient.

use super::{expect_args, type_mismatch};
use crate::error::TensorError;
use crate::operations::{apply, apply_binary, sum};
use crate::value::Value;

type Grads = Result<Vec<Option<Value>>, TensorError>;

pub(super) fn map_num<F>(op: &str, v: &Value, f: F) -> Result<Value, TensorError>
where
    F: Fn(f64) -> f64,
{
    match v {
        Value::Scalar(x) => Ok(Value::Scalar(f(*x))),
        Value::Tensor(t) => Ok(Value::Tensor(apply(t, f))),
        other => Err(type_mismatch(op, "scalar or tensor", other)),
    }
}

pub(super) fn zip_num<F>(op: &str, a: &Value, b: &Value, f: F) -> Result<Value, TensorError>
where
    F: Fn(f64, f64) -> f64,
{
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(f(*x, *y))),
        (Value::Tensor(x), Value::Tensor(y)) => Ok(Value::Tensor(apply_binary(x, y, f)?)),
        (Value::Scalar(x), Value::Tensor(y)) => Ok(Value::Tensor(apply(y, |v| f(*x, v)))),
        (Value::Tensor(x), Value::Scalar(y)) => Ok(Value::Tensor(apply(x, |v| f(v, *y)))),
        (Value::Scalar(_) | Value::Tensor(_), other) | (other, _) => {
            Err(type_mismatch(op, "scalar or tensor", other))
        }
    }
}

/// Reduce a gradient back to the shape of the operand it belongs to.
pub(super) fn unbroadcast(grad: Value, like: &Value) -> Value {
    match (grad, like) {
        (Value::Tensor(g), Value::Scalar(_)) => Value::Scalar(sum(&g)),
        (g, _) => g,
    }
}

fn unary<F: Fn(f64) -> f64>(op: &str, args: &[Value], f: F) -> Result<Value, TensorError> {
    expect_args(op, args, 1)?;
    map_num(op, &args[0], f)
}

fn binary<F: Fn(f64, f64) -> f64>(op: &str, args: &[Value], f: F) -> Result<Value, TensorError> {
    expect_args(op, args, 2)?;
    zip_num(op, &args[0], &args[1], f)
}

pub(super) fn neg(args: &[Value]) -> Result<Value, TensorError> {
    unary("neg", args, |x| -x)
}

pub(super) fn neg_grad(g: &Value, _args: &[Value], _out: &Value) -> Grads {
    Ok(vec![Some(map_num("neg", g, |x| -x)?)])
}

pub(super) fn add(args: &[Value]) -> Result<Value, TensorError> {
    binary("add", args, |x, y| x + y)
}

pub(super) fn add_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    Ok(vec![
        Some(unbroadcast(g.clone(), &args[0])),
        Some(unbroadcast(g.clone(), &args[1])),
    ])
}

pub(super) fn sub(args: &[Value]) -> Result<Value, TensorError> {
    binary("sub", args, |x, y| x - y)
}

pub(super) fn sub_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let minus = map_num("sub", g, |x| -x)?;
    Ok(vec![
        Some(unbroadcast(g.clone(), &args[0])),
        Some(unbroadcast(minus, &args[1])),
    ])
}

pub(super) fn mul(args: &[Value]) -> Result<Value, TensorError> {
    binary("mul", args, |x, y| x * y)
}

pub(super) fn mul_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let (a, b) = (&args[0], &args[1]);
    Ok(vec![
        Some(unbroadcast(zip_num("mul", g, b, |g, y| g * y)?, a)),
        Some(unbroadcast(zip_num("mul", g, a, |g, x| g * x)?, b)),
    ])
}

pub(super) fn div(args: &[Value]) -> Result<Value, TensorError> {
    binary("div", args, |x, y| x / y)
}

pub(super) fn div_grad(g: &Value, args: &[Value], out: &Value) -> Grads {
    let (a, b) = (&args[0], &args[1]);
    // d(a/b)/db = -(a/b)/b
    let g_out = zip_num("div", g, out, |g, q| g * q)?;
    Ok(vec![
        Some(unbroadcast(zip_num("div", g, b, |g, y| g / y)?, a)),
        Some(unbroadcast(zip_num("div", &g_out, b, |gq, y| -gq / y)?, b)),
    ])
}

/// `x * alpha` with `alpha` a scalar argument.
pub(super) fn scale(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("scale", args, 2)?;
    let Value::Scalar(alpha) = args[1] else {
        return Err(type_mismatch("scale", "scalar", &args[1]));
    };
    map_num("scale", &args[0], |x| x * alpha)
}

pub(super) fn scale_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let alpha = args[1].to_f64().unwrap_or_default();
    let gx = zip_num("scale", g, &args[0], |g, x| g * x)?;
    let d_alpha = match gx {
        Value::Tensor(t) => sum(&t),
        other => other.to_f64().unwrap_or_default(),
    };
    Ok(vec![
        Some(map_num("scale", g, |g| g * alpha)?),
        Some(Value::Scalar(d_alpha)),
    ])
}

pub(super) fn exp(args: &[Value]) -> Result<Value, TensorError> {
    unary("exp", args, f64::exp)
}

pub(super) fn exp_grad(g: &Value, _args: &[Value], out: &Value) -> Grads {
    Ok(vec![Some(zip_num("exp", g, out, |g, y| g * y)?)])
}

pub(super) fn log(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("log", args, 1)?;
    let bad = match &args[0] {
        Value::Scalar(x) => (*x <= 0.0).then_some(*x),
        Value::Tensor(t) => t.data().iter().copied().find(|&x| x <= 0.0),
        _ => None,
    };
    if let Some(x) = bad {
        return Err(TensorError::InvalidOperation(format!(
            "log of non-positive value {x}"
        )));
    }
    map_num("log", &args[0], f64::ln)
}

pub(super) fn log_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    Ok(vec![Some(zip_num("log", g, &args[0], |g, x| g / x)?)])
}

pub(super) fn tanh(args: &[Value]) -> Result<Value, TensorError> {
    unary("tanh", args, f64::tanh)
}

pub(super) fn tanh_grad(g: &Value, _args: &[Value], out: &Value) -> Grads {
    Ok(vec![Some(zip_num("tanh", g, out, |g, y| g * (1.0 - y * y))?)])
}

pub(super) fn square(args: &[Value]) -> Result<Value, TensorError> {
    unary("square", args, |x| x * x)
}

pub(super) fn square_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    Ok(vec![Some(zip_num("square", g, &args[0], |g, x| 2.0 * g * x)?)])
}
