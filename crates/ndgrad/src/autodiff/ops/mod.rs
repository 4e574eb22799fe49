//! Builtin primitive library.
//!
//! Each primitive pairs a raw kernel from [`crate::operations`] with its
//! vector-Jacobian product. The typed helpers below route through
//! [`Trace::call`], so they record when an argument is traced and run raw
//! otherwise.
//!
//! | name | arguments | gradient |
//! |------|-----------|----------|
//! | `neg`, `exp`, `log`, `tanh`, `square` | x | element-wise |
//! | `add`, `sub`, `mul`, `div` | a, b (scalar broadcasts) | summed back to scalars |
//! | `scale` | x, alpha | both |
//! | `sum`, `mean` | x | fills x's shape |
//! | `dot`, `matvec`, `matmul` | a, b | both |
//! | `add_n` | one sequence | one entry per element |
//! | `stop_gradient` | x | none |

mod elementwise;
mod linalg;
mod reduce;

use once_cell::sync::Lazy;

use super::primitive::{Primitive, PrimitiveRegistry};
use super::trace::Trace;
use super::traced::Arg;
use crate::error::{Result, TensorError};
use crate::value::Value;

pub(crate) fn expect_args(op: &str, args: &[Value], n: usize) -> Result<(), TensorError> {
    if args.len() != n {
        return Err(TensorError::WrongArgumentCount {
            op: op.to_string(),
            expected: n,
            actual: args.len(),
        });
    }
    Ok(())
}

pub(crate) fn type_mismatch(op: &str, expected: &'static str, got: &Value) -> TensorError {
    TensorError::TypeMismatch {
        op: op.to_string(),
        expected,
        actual: got.kind(),
    }
}

fn identity(args: &[Value]) -> Result<Value, TensorError> {
    expect_args("stop_gradient", args, 1)?;
    Ok(args[0].clone())
}

static NEG: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("neg", elementwise::neg, elementwise::neg_grad));
static ADD: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("add", elementwise::add, elementwise::add_grad));
static SUB: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("sub", elementwise::sub, elementwise::sub_grad));
static MUL: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("mul", elementwise::mul, elementwise::mul_grad));
static DIV: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("div", elementwise::div, elementwise::div_grad));
static SCALE: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("scale", elementwise::scale, elementwise::scale_grad));
static EXP: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("exp", elementwise::exp, elementwise::exp_grad));
static LOG: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("log", elementwise::log, elementwise::log_grad));
static TANH: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("tanh", elementwise::tanh, elementwise::tanh_grad));
static SQUARE: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("square", elementwise::square, elementwise::square_grad));
static SUM: Lazy<Primitive> = Lazy::new(|| Primitive::new("sum", reduce::sum, reduce::sum_grad));
static MEAN: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("mean", reduce::mean, reduce::mean_grad));
static ADD_N: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("add_n", reduce::add_n, reduce::add_n_grad));
static DOT: Lazy<Primitive> = Lazy::new(|| Primitive::new("dot", linalg::dot, linalg::dot_grad));
static MATVEC: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("matvec", linalg::matvec, linalg::matvec_grad));
static MATMUL: Lazy<Primitive> =
    Lazy::new(|| Primitive::new("matmul", linalg::matmul, linalg::matmul_grad));
static STOP_GRADIENT: Lazy<Primitive> =
    Lazy::new(|| Primitive::non_differentiable("stop_gradient", identity));

static BUILTINS: Lazy<PrimitiveRegistry> = Lazy::new(|| {
    let mut registry = PrimitiveRegistry::new();
    for prim in [
        &NEG,
        &ADD,
        &SUB,
        &MUL,
        &DIV,
        &SCALE,
        &EXP,
        &LOG,
        &TANH,
        &SQUARE,
        &SUM,
        &MEAN,
        &ADD_N,
        &DOT,
        &MATVEC,
        &MATMUL,
        &STOP_GRADIENT,
    ] {
        registry.insert_unique(Primitive::clone(prim));
    }
    registry
});

/// A registry holding every builtin primitive. Callers may register their
/// own primitives on the returned copy.
pub fn builtin_registry() -> PrimitiveRegistry {
    BUILTINS.clone()
}

pub fn neg(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&NEG, &[x.clone()])
}

pub fn add(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&ADD, &[a.clone(), b.clone()])
}

pub fn sub(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&SUB, &[a.clone(), b.clone()])
}

pub fn mul(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&MUL, &[a.clone(), b.clone()])
}

pub fn div(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&DIV, &[a.clone(), b.clone()])
}

/// `x * alpha`; `alpha` must be a scalar and may itself be traced.
pub fn scale(tr: &mut Trace<'_>, x: &Arg, alpha: &Arg) -> Result<Arg> {
    tr.call(&SCALE, &[x.clone(), alpha.clone()])
}

pub fn exp(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&EXP, &[x.clone()])
}

/// Natural logarithm. Non-positive inputs are an operand error.
pub fn log(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&LOG, &[x.clone()])
}

pub fn tanh(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&TANH, &[x.clone()])
}

pub fn square(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&SQUARE, &[x.clone()])
}

pub fn sum(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&SUM, &[x.clone()])
}

pub fn mean(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&MEAN, &[x.clone()])
}

/// Sum of all `xs`, passed to the primitive as one sequence argument.
pub fn add_n(tr: &mut Trace<'_>, xs: &[Arg]) -> Result<Arg> {
    tr.call(&ADD_N, &[Arg::Seq(xs.to_vec())])
}

pub fn dot(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&DOT, &[a.clone(), b.clone()])
}

pub fn matvec(tr: &mut Trace<'_>, w: &Arg, x: &Arg) -> Result<Arg> {
    tr.call(&MATVEC, &[w.clone(), x.clone()])
}

pub fn matmul(tr: &mut Trace<'_>, a: &Arg, b: &Arg) -> Result<Arg> {
    tr.call(&MATMUL, &[a.clone(), b.clone()])
}

/// Identity in the forward direction; blocks gradient flow.
pub fn stop_gradient(tr: &mut Trace<'_>, x: &Arg) -> Result<Arg> {
    tr.call(&STOP_GRADIENT, &[x.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;
    use crate::autodiff::graph::Tape;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 17);
        for name in ["neg", "add_n", "matmul", "stop_gradient"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.get("stop_gradient").unwrap().is_differentiable());
    }

    #[test]
    fn test_registry_copy_is_extensible() {
        let mut registry = builtin_registry();
        registry
            .register(Primitive::non_differentiable("noop", |args| Ok(args[0].clone())))
            .unwrap();
        assert_eq!(registry.len(), 18);
        assert_eq!(builtin_registry().len(), 17);
    }

    #[test]
    fn test_helpers_run_raw_without_traced_args() {
        let mut tr = Trace::detached();
        let x = Arg::from(Tensor::full(&[3], 2.0));
        let y = square(&mut tr, &x).unwrap();
        let s = sum(&mut tr, &y).unwrap();
        assert_eq!(s.to_f64(), Some(12.0));
    }

    #[test]
    fn test_stop_gradient_records_but_blocks() {
        let mut tape = Tape::new();
        let mut tr = Trace::new(&mut tape);
        let x = tr.root(Value::Scalar(2.0));
        let y = stop_gradient(&mut tr, &x).unwrap();
        assert!(y.is_traced());
        assert_eq!(tr.recorded(), 2);
    }
}
