//! Storage for tensor data.
//!
//! Storage is always a flat buffer; shape and strides live on the `Tensor`
//! wrapper. Only dense storage exists: sparse gradient representations are
//! out of scope for this crate.

mod dense;

pub use dense::Dense;
