//! Root attachment and gradient extraction.
//!
//! Every tensor leaf of the differentiable input becomes a root node; after
//! the sweep, each root's accumulated gradient is read back into a value of
//! the input's structure.

use super::graph::Tape;
use super::trace::Trace;
use super::traced::Arg;
use crate::tensor::Tensor;
use crate::value::Value;

/// Wrap `input` for the user function, recording a root per tensor leaf.
pub(crate) fn attach_roots(trace: &mut Trace<'_>, input: &Value) -> Arg {
    match input {
        Value::Tensor(_) => trace.root(input.clone()),
        Value::Map(m) => Arg::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), attach_roots(trace, v)))
                .collect(),
        ),
        Value::Seq(s) => Arg::Seq(s.iter().map(|v| attach_roots(trace, v)).collect()),
        other => Arg::Raw(other.clone()),
    }
}

/// Gradient of the output with respect to `roots`, shaped like the input.
///
/// Roots the sweep never reached get zeros. Scalar leaves were never roots
/// and get `0.0`; booleans and strings are copied as they are.
pub(crate) fn extract_gradients(tape: &Tape, roots: &Arg) -> Value {
    match roots {
        Arg::Traced(t) => {
            let like = t.value();
            match tape.node(t.node_id()).and_then(|n| n.grad()) {
                Some(g) => conform(g.clone(), like),
                None => like.zeros_like(),
            }
        }
        Arg::Map(m) => Value::Map(
            m.iter()
                .map(|(k, a)| (k.clone(), extract_gradients(tape, a)))
                .collect(),
        ),
        Arg::Seq(s) => Value::Seq(s.iter().map(|a| extract_gradients(tape, a)).collect()),
        Arg::Raw(v) => v.zeros_like(),
    }
}

/// A scalar gradient reaching a one-element tensor root takes the root's shape.
fn conform(grad: Value, like: &Value) -> Value {
    match (grad, like) {
        (Value::Scalar(g), Value::Tensor(t)) => Value::Tensor(Tensor::full(t.shape(), g)),
        (g, _) => g,
    }
}
