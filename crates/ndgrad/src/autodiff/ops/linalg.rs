//! Products: `dot`, `matvec`, `matmul`.

use super::{expect_args, type_mismatch};
use crate::error::TensorError;
use crate::operations::{self, matmul as gemm, outer, scale, transpose};
use crate::tensor::Tensor;
use crate::value::Value;

type Grads = Result<Vec<Option<Value>>, TensorError>;

fn tensor<'a>(op: &str, v: &'a Value) -> Result<&'a Tensor, TensorError> {
    v.as_tensor().ok_or_else(|| type_mismatch(op, "tensor", v))
}

fn pair<'a>(op: &str, args: &'a [Value]) -> Result<(&'a Tensor, &'a Tensor), TensorError> {
    expect_args(op, args, 2)?;
    Ok((tensor(op, &args[0])?, tensor(op, &args[1])?))
}

pub(super) fn dot(args: &[Value]) -> Result<Value, TensorError> {
    let (a, b) = pair("dot", args)?;
    Ok(Value::Scalar(operations::dot(a, b)?))
}

pub(super) fn dot_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let (a, b) = pair("dot", args)?;
    let g = g
        .to_f64()
        .ok_or_else(|| type_mismatch("dot", "scalar gradient", g))?;
    Ok(vec![
        Some(Value::Tensor(scale(b, g))),
        Some(Value::Tensor(scale(a, g))),
    ])
}

pub(super) fn matvec(args: &[Value]) -> Result<Value, TensorError> {
    let (w, x) = pair("matvec", args)?;
    Ok(Value::Tensor(operations::matvec(w, x)?))
}

pub(super) fn matvec_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let (w, x) = pair("matvec", args)?;
    let g = tensor("matvec", g)?;
    Ok(vec![
        Some(Value::Tensor(outer(g, x)?)),
        Some(Value::Tensor(operations::matvec(&transpose(w)?, g)?)),
    ])
}

pub(super) fn matmul(args: &[Value]) -> Result<Value, TensorError> {
    let (a, b) = pair("matmul", args)?;
    Ok(Value::Tensor(gemm(a, b)?))
}

pub(super) fn matmul_grad(g: &Value, args: &[Value], _out: &Value) -> Grads {
    let (a, b) = pair("matmul", args)?;
    let g = tensor("matmul", g)?;
    Ok(vec![
        Some(Value::Tensor(gemm(g, &transpose(b)?)?)),
        Some(Value::Tensor(gemm(&transpose(a)?, g)?)),
    ])
}
