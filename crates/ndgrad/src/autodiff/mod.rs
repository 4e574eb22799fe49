//! Tape-based reverse-mode automatic differentiation.
//!
//! Differentiated code is an ordinary Rust function that calls primitives
//! through an explicit [`Trace`]. There is no global state: the trace
//! carries the active tape, and a call with no traced argument never
//! touches it.
//!
//! # Architecture
//!
//! ```text
//! Grad<F> ──owns──► Tape (Vec<TapeNode>, recycled between calls)
//!    │                 ▲
//!    │ call            │ record
//!    ▼                 │
//! f(&mut Trace, &Arg, aux) ──Trace::call──► Primitive { forward, backward }
//!    │
//!    ▼
//! sweep: descending index order, contributions added into earlier nodes
//! ```
//!
//! # Example
//!
//! ```
//! use ndgrad::{Tensor, Value};
//! use ndgrad::autodiff::{Grad, ops};
//!
//! let mut grad = Grad::new(|tr, input, _aux| {
//!     let w = input.get("w").cloned().unwrap_or(0.0.into());
//!     let x = input.get("x").cloned().unwrap_or(0.0.into());
//!     let y = ops::matvec(tr, &w, &x)?;
//!     ops::sum(tr, &y)
//! });
//!
//! let input = Value::map([
//!     ("w", Value::Tensor(Tensor::full(&[2, 3], 0.5))),
//!     ("x", Value::Tensor(Tensor::ones(&[3]))),
//! ]);
//! let (g, out) = grad.call(&input, &[]).unwrap();
//! assert_eq!(out, 3.0);
//! assert_eq!(g.get("x").unwrap().as_tensor().unwrap().data(), &[1.0, 1.0, 1.0]);
//!
//! // same structure again: every slot is recycled
//! grad.call(&input, &[]).unwrap();
//! assert_eq!(grad.stats().fresh, 0);
//! ```
//!
//! # Key Types
//!
//! - [`Grad`] / [`differentiate`]: the driver
//! - [`Trace`]: recording context and interception point
//! - [`Arg`] / [`Traced`]: tagged arguments
//! - [`Primitive`] / [`PrimitiveRegistry`]: operations and their VJPs
//! - [`Tape`]: the node arena
//! - [`check_grad`]: finite-difference verification

mod backward;
mod check;
mod grad;
mod gradients;
mod graph;
pub mod ops;
mod primitive;
mod trace;
mod traced;

pub use backward::{SweepReport, sweep};
pub use check::{
    DirectionalCheck, GradCheckConfig, GradCheckFailure, GradCheckReport, check, check_grad,
    quick_check,
};
pub use grad::{Grad, differentiate, value_and_grad};
pub use graph::{
    ArgRef, Fingerprint, NodeId, RecyclePolicy, RecycleStats, Tape, TapeId, TapeNode,
};
pub use primitive::{BackwardFn, ForwardFn, Primitive, PrimitiveRegistry};
pub use trace::Trace;
pub use traced::{Arg, Traced};
