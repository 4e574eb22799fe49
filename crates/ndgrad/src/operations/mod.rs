//! Numeric kernels on dense tensors.
//!
//! These are the raw operations the reference primitive library in
//! [`crate::autodiff::ops`] wraps. They know nothing about tracing.
//!
//! ```text
//! elementwise  apply, apply_binary, add, sub, mul, div, scale, axpy
//! reduce       sum, mean, norm, norm_sqr, max_abs
//! linalg       matmul, matvec, outer, dot, transpose   (faer GEMM)
//! ```

mod elementwise;
mod linalg;
mod reduce;

pub use elementwise::{add, apply, apply_binary, axpy, div, mul, scale, sub};
pub use linalg::{dot, matmul, matvec, outer, transpose};
pub use reduce::{max_abs, mean, norm, norm_sqr, sum};
