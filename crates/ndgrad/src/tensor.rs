//! Dense n-dimensional `f64` tensor.
//!
//! This is the numeric value that flows through differentiated code. The
//! engine only relies on shape introspection, zero construction and the
//! arithmetic in [`crate::operations`]; everything else here is convenience.

use crate::error::TensorError;
use crate::storage::Dense;
use crate::strides::{Dims, cartesian_to_linear, compute_strides, shape_len};

/// A dense n-dimensional array of `f64` in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: Dense,
    shape: Dims,
    strides: Dims,
}

impl Tensor {
    /// Create a zero-initialized tensor.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndgrad::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            storage: Dense::zeros(shape_len(shape)),
            shape: Dims::from_slice(shape),
            strides: compute_strides(shape),
        }
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Create a tensor with every element equal to `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            storage: Dense::from_vec(vec![value; shape_len(shape)]),
            shape: Dims::from_slice(shape),
            strides: compute_strides(shape),
        }
    }

    /// Rank-0 tensor holding one value.
    pub fn scalar(value: f64) -> Self {
        Self::full(&[], value)
    }

    /// Create tensor from column-major data and shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndgrad::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.get(&[1, 0]), Some(&2.0)); // column-major
    /// assert_eq!(t.get(&[0, 1]), Some(&3.0));
    /// ```
    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> Result<Self, TensorError> {
        let expected = shape_len(shape);
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            storage: Dense::from_vec(data),
            shape: Dims::from_slice(shape),
            strides: compute_strides(shape),
        })
    }

    /// Wrap storage whose length is already known to match `shape`.
    pub(crate) fn from_dense(storage: Dense, shape: &[usize]) -> Self {
        debug_assert_eq!(storage.len(), shape_len(shape));
        Self {
            storage,
            shape: Dims::from_slice(shape),
            strides: compute_strides(shape),
        }
    }

    /// Zero tensor with the same shape as `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape)
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn data(&self) -> &[f64] {
        self.storage.as_slice()
    }

    /// Mutable data; detaches from any view sharing this buffer.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        self.storage.as_mut_slice()
    }

    /// Consume the tensor, returning its column-major data.
    pub fn into_vec(self) -> Vec<f64> {
        self.storage.into_vec()
    }

    #[inline]
    pub fn get_linear(&self, i: usize) -> Option<&f64> {
        self.storage.as_slice().get(i)
    }

    /// Get element by cartesian indices.
    ///
    /// Returns `None` if indices are out of bounds or of the wrong count.
    pub fn get(&self, indices: &[usize]) -> Option<&f64> {
        if indices.len() != self.ndim() {
            return None;
        }
        if indices.iter().zip(self.shape.iter()).any(|(&i, &d)| i >= d) {
            return None;
        }
        self.get_linear(cartesian_to_linear(indices, &self.strides))
    }

    /// Set element by cartesian indices.
    ///
    /// # Errors
    ///
    /// Returns error if indices are out of bounds or of the wrong count.
    pub fn set(&mut self, indices: &[usize], value: f64) -> Result<(), TensorError> {
        if indices.len() != self.ndim() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        for (&index, &dim_size) in indices.iter().zip(self.shape.iter()) {
            if index >= dim_size {
                return Err(TensorError::IndexOutOfBounds { index, dim_size });
            }
        }
        let linear = cartesian_to_linear(indices, &self.strides);
        self.storage.as_mut_slice()[linear] = value;
        Ok(())
    }

    /// Fill all elements with a value.
    pub fn fill(&mut self, value: f64) {
        self.data_mut().fill(value);
    }

    /// Reshape without copying; the result shares storage with `self`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the element counts differ.
    ///
    /// ```
    /// use ndgrad::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let flat = t.reshape(&[6]).unwrap();
    /// assert!(t.shares_storage_with(&flat));
    /// ```
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self, TensorError> {
        let new_len = shape_len(new_shape);
        if new_len != self.len() {
            return Err(TensorError::ShapeMismatch {
                expected: self.len(),
                actual: new_len,
            });
        }
        Ok(Self {
            storage: self.storage.view(),
            shape: Dims::from_slice(new_shape),
            strides: compute_strides(new_shape),
        })
    }

    /// Check if this tensor shares storage with another tensor.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        self.storage.shares_storage_with(&other.storage)
    }

    /// Check if another tensor views this tensor's buffer.
    pub fn is_view(&self) -> bool {
        self.storage.is_shared()
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> Option<f64> {
        (self.len() == 1).then(|| self.data()[0])
    }
}
