//! ndgrad - tape-based reverse-mode automatic differentiation
//!
//! Differentiates ordinary Rust functions over dense tensors and nested
//! containers of them. Numeric work is delegated to opaque primitives, each a
//! `{forward, backward}` pair; the engine itself only records, routes and
//! adds.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Driver (autodiff::grad, autodiff::check)
//!     → differentiate, Grad, check_grad
//!
//! Level 2: Recording (autodiff::trace, autodiff::graph)
//!     → Trace::call, Tape with verified slot recycling
//!
//! Level 3: Primitives (autodiff::ops) over kernels (operations)
//!     → elementwise, reductions, faer-backed products
//! ```
//!
//! # Example
//!
//! ```
//! use ndgrad::{Tensor, Value, differentiate};
//! use ndgrad::autodiff::ops;
//!
//! // f(x) = sum(-x) at x = 5 * ones(10)
//! let x = Value::Tensor(Tensor::full(&[10], 5.0));
//! let (grad, out) = differentiate(
//!     |tr, x, _| {
//!         let y = ops::neg(tr, x)?;
//!         ops::sum(tr, &y)
//!     },
//!     &x,
//!     &[],
//! )
//! .unwrap();
//!
//! assert_eq!(out, -50.0);
//! assert!(grad.as_tensor().unwrap().data().iter().all(|&g| g == -1.0));
//! ```

pub mod autodiff;
pub mod error;
pub mod operations;
pub mod random;
pub mod storage;
pub mod strides;
pub mod tensor;
pub mod value;

pub use autodiff::{
    Arg, Grad, GradCheckConfig, GradCheckReport, Primitive, PrimitiveRegistry, Tape, Trace,
    check_grad, differentiate, value_and_grad,
};
pub use error::{AutodiffError, TensorError};
pub use storage::Dense;
pub use tensor::Tensor;
pub use value::{LeafPath, PathSegment, Value};
