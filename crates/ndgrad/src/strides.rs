//! Shape and stride utilities.
//!
//! Tensors are stored column-major (Fortran order), which is also what faer
//! expects, so 2-D tensors can be handed to faer without copying.

use smallvec::SmallVec;

/// Inline storage for shapes and strides; most tensors have rank <= 4.
pub type Dims = SmallVec<[usize; 4]>;

/// Number of stored elements for a shape.
///
/// A rank-0 shape holds a single element.
#[inline]
pub fn shape_len(shape: &[usize]) -> usize {
    if shape.is_empty() {
        1
    } else {
        shape.iter().product()
    }
}

/// Compute column-major strides from shape.
///
/// For shape [d0, d1, d2, ...], returns strides [1, d0, d0*d1, ...].
///
/// # Examples
///
/// ```
/// use ndgrad::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]).as_slice(), &[1, 3, 12]);
/// assert!(compute_strides(&[]).is_empty());
/// ```
pub fn compute_strides(shape: &[usize]) -> Dims {
    let mut strides = Dims::with_capacity(shape.len());
    let mut stride = 1;
    for &dim in shape {
        strides.push(stride);
        stride *= dim;
    }
    strides
}

/// Convert cartesian indices to a linear offset.
#[inline]
pub fn cartesian_to_linear(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&idx, &stride)| idx * stride)
        .sum()
}
