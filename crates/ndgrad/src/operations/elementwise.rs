//! Element-wise tensor operations.

use crate::error::TensorError;
use crate::tensor::Tensor;

/// Apply a function to each element, returning a new tensor.
///
/// # Example
///
/// ```
/// use ndgrad::Tensor;
/// use ndgrad::operations::apply;
///
/// let t = Tensor::from_vec(vec![1.0, 4.0, 9.0], &[3]).unwrap();
/// let ts = apply(&t, f64::sqrt);
/// assert_eq!(ts.data(), &[1.0, 2.0, 3.0]);
/// ```
pub fn apply<F>(tensor: &Tensor, f: F) -> Tensor
where
    F: Fn(f64) -> f64,
{
    let mut out = tensor.clone();
    for x in out.data_mut() {
        *x = f(*x);
    }
    out
}

/// Combine two same-shaped tensors element-wise.
///
/// # Errors
///
/// Returns `IncompatibleShapes` when the shapes differ.
///
/// # Example
///
/// ```
/// use ndgrad::Tensor;
/// use ndgrad::operations::apply_binary;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
/// let b = Tensor::from_vec(vec![4.0, 5.0, 6.0], &[3]).unwrap();
/// let c = apply_binary(&a, &b, |x, y| x + y).unwrap();
/// assert_eq!(c.data(), &[5.0, 7.0, 9.0]);
/// ```
pub fn apply_binary<F>(a: &Tensor, b: &Tensor, f: F) -> Result<Tensor, TensorError>
where
    F: Fn(f64, f64) -> f64,
{
    check_same_shape(a, b)?;
    let mut out = a.clone();
    for (x, &y) in out.data_mut().iter_mut().zip(b.data()) {
        *x = f(*x, y);
    }
    Ok(out)
}

pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    apply_binary(a, b, |x, y| x + y)
}

pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    apply_binary(a, b, |x, y| x - y)
}

pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    apply_binary(a, b, |x, y| x * y)
}

pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    apply_binary(a, b, |x, y| x / y)
}

/// Multiply all elements by a scalar.
pub fn scale(tensor: &Tensor, alpha: f64) -> Tensor {
    apply(tensor, |x| x * alpha)
}

/// `y += alpha * x`, in place.
///
/// This is the accumulation kernel of the backward pass; `y` is only copied
/// if its buffer is shared with another tensor.
pub fn axpy(alpha: f64, x: &Tensor, y: &mut Tensor) -> Result<(), TensorError> {
    check_same_shape(x, y)?;
    for (yi, &xi) in y.data_mut().iter_mut().zip(x.data()) {
        *yi += alpha * xi;
    }
    Ok(())
}

fn check_same_shape(a: &Tensor, b: &Tensor) -> Result<(), TensorError> {
    if a.shape() != b.shape() {
        return Err(TensorError::IncompatibleShapes {
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_binary_shape_mismatch() {
        let a = Tensor::zeros(&[2, 3]);
        let b = Tensor::zeros(&[3, 2]);
        let err = apply_binary(&a, &b, |x, y| x + y).unwrap_err();
        assert!(matches!(err, TensorError::IncompatibleShapes { .. }));
    }

    #[test]
    fn test_arithmetic() {
        let a = Tensor::from_vec(vec![6.0, 8.0], &[2]).unwrap();
        let b = Tensor::from_vec(vec![2.0, 4.0], &[2]).unwrap();
        assert_eq!(add(&a, &b).unwrap().data(), &[8.0, 12.0]);
        assert_eq!(sub(&a, &b).unwrap().data(), &[4.0, 4.0]);
        assert_eq!(mul(&a, &b).unwrap().data(), &[12.0, 32.0]);
        assert_eq!(div(&a, &b).unwrap().data(), &[3.0, 2.0]);
        assert_eq!(scale(&a, 0.5).data(), &[3.0, 4.0]);
    }

    #[test]
    fn test_apply_does_not_touch_input() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = apply(&a, |x| -x);
        assert_eq!(a.data(), &[1.0, 2.0]);
        assert_eq!(b.data(), &[-1.0, -2.0]);
    }

    #[test]
    fn test_axpy_detaches_shared_buffer() {
        let x = Tensor::ones(&[3]);
        let original = Tensor::zeros(&[3]);
        let mut y = original.clone();
        axpy(2.0, &x, &mut y).unwrap();
        assert_eq!(y.data(), &[2.0, 2.0, 2.0]);
        assert_eq!(original.data(), &[0.0, 0.0, 0.0]);
    }
}
