//! Reductions over all elements.

use crate::tensor::Tensor;

/// Sum of all elements.
pub fn sum(tensor: &Tensor) -> f64 {
    tensor.data().iter().sum()
}

/// Arithmetic mean of all elements; `0.0` for an empty tensor.
pub fn mean(tensor: &Tensor) -> f64 {
    if tensor.is_empty() {
        return 0.0;
    }
    sum(tensor) / tensor.len() as f64
}

/// Frobenius (L2) norm.
///
/// ```
/// use ndgrad::Tensor;
/// use ndgrad::operations::norm;
///
/// let t = Tensor::from_vec(vec![3.0, 4.0], &[2]).unwrap();
/// assert!((norm(&t) - 5.0).abs() < 1e-10);
/// ```
pub fn norm(tensor: &Tensor) -> f64 {
    norm_sqr(tensor).sqrt()
}

/// Squared Frobenius norm.
pub fn norm_sqr(tensor: &Tensor) -> f64 {
    tensor.data().iter().map(|x| x * x).sum()
}

/// Largest absolute element; `0.0` for an empty tensor.
pub fn max_abs(tensor: &Tensor) -> f64 {
    tensor.data().iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}
