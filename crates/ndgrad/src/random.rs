//! Random tensor construction.
//!
//! Used to build test inputs and the probe directions of
//! [`crate::autodiff::quick_check`].

use rand::Rng;
use rand::distr::{StandardUniform, Uniform};
use rand_distr::StandardNormal;

use crate::strides::shape_len;
use crate::storage::Dense;
use crate::tensor::Tensor;

impl Tensor {
    /// Create a tensor with uniform random values in [0, 1).
    pub fn random(shape: &[usize]) -> Self {
        Self::random_with_rng(shape, &mut rand::rng())
    }

    /// Uniform [0, 1) values drawn from a caller-provided RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use ndgrad::Tensor;
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let t1 = Tensor::random_with_rng(&[2, 3], &mut StdRng::seed_from_u64(42));
    /// let t2 = Tensor::random_with_rng(&[2, 3], &mut StdRng::seed_from_u64(42));
    /// assert_eq!(t1.data(), t2.data());
    /// ```
    pub fn random_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        Self::sampled(shape, || rng.sample(StandardUniform))
    }

    /// Uniform values in `[low, high)`.
    ///
    /// Falls back to a constant `low` tensor when the range is empty.
    pub fn uniform_with_rng<R: Rng>(shape: &[usize], low: f64, high: f64, rng: &mut R) -> Self {
        match Uniform::new(low, high) {
            Ok(dist) => Self::sampled(shape, || rng.sample(&dist)),
            Err(_) => Self::full(shape, low),
        }
    }

    /// Create a tensor with standard normal random values.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with_rng(shape, &mut rand::rng())
    }

    /// Standard normal values drawn from a caller-provided RNG.
    pub fn randn_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        Self::sampled(shape, || rng.sample(StandardNormal))
    }

    fn sampled(shape: &[usize], mut sample: impl FnMut() -> f64) -> Self {
        let data: Vec<f64> = (0..shape_len(shape)).map(|_| sample()).collect();
        Self::from_dense(Dense::from_vec(data), shape)
    }
}
