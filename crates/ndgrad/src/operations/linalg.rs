//! Matrix products backed by faer's GEMM.
//!
//! Column-major tensors are viewed as faer matrices without copying, so a
//! rank-1 tensor of length `n` is an `n x 1` column.

use faer::linalg::matmul::matmul as gemm;
use faer::{Accum, MatMut, MatRef, Par};

use crate::error::TensorError;
use crate::tensor::Tensor;

fn as_mat(tensor: &Tensor, rows: usize, cols: usize) -> MatRef<'_, f64> {
    MatRef::from_column_major_slice(tensor.data(), rows, cols)
}

fn as_mat_mut(tensor: &mut Tensor, rows: usize, cols: usize) -> MatMut<'_, f64> {
    MatMut::from_column_major_slice_mut(tensor.data_mut(), rows, cols)
}

fn expect_rank(tensor: &Tensor, rank: usize) -> Result<(), TensorError> {
    if tensor.ndim() != rank {
        return Err(TensorError::RankMismatch {
            expected: rank,
            actual: tensor.ndim(),
        });
    }
    Ok(())
}

fn incompatible(a: &Tensor, b: &Tensor) -> TensorError {
    TensorError::IncompatibleShapes {
        left: a.shape().to_vec(),
        right: b.shape().to_vec(),
    }
}

/// Matrix product `C[m, n] = A[m, k] * B[k, n]`.
///
/// # Example
///
/// ```
/// use ndgrad::Tensor;
/// use ndgrad::operations::matmul;
///
/// let a = Tensor::ones(&[2, 3]);
/// let b = Tensor::ones(&[3, 4]);
/// let c = matmul(&a, &b).unwrap();
/// assert_eq!(c.shape(), &[2, 4]);
/// assert!(c.data().iter().all(|&x| x == 3.0));
/// ```
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    expect_rank(a, 2)?;
    expect_rank(b, 2)?;
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let (k2, n) = (b.shape()[0], b.shape()[1]);
    if k != k2 {
        return Err(incompatible(a, b));
    }

    let mut c = Tensor::zeros(&[m, n]);
    gemm(
        as_mat_mut(&mut c, m, n),
        Accum::Replace,
        as_mat(a, m, k),
        as_mat(b, k, n),
        1.0,
        Par::Seq,
    );
    Ok(c)
}

/// Matrix-vector product `y[m] = A[m, n] * x[n]`.
pub fn matvec(a: &Tensor, x: &Tensor) -> Result<Tensor, TensorError> {
    expect_rank(a, 2)?;
    expect_rank(x, 1)?;
    let (m, n) = (a.shape()[0], a.shape()[1]);
    if x.shape()[0] != n {
        return Err(incompatible(a, x));
    }

    let mut y = Tensor::zeros(&[m]);
    gemm(
        as_mat_mut(&mut y, m, 1),
        Accum::Replace,
        as_mat(a, m, n),
        as_mat(x, n, 1),
        1.0,
        Par::Seq,
    );
    Ok(y)
}

/// Outer product of two vectors, `C[i, j] = a[i] * b[j]`.
pub fn outer(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    expect_rank(a, 1)?;
    expect_rank(b, 1)?;
    let (m, n) = (a.len(), b.len());

    let mut c = Tensor::zeros(&[m, n]);
    // C = A * B^T with A (m, 1) and B (n, 1)
    gemm(
        as_mat_mut(&mut c, m, n),
        Accum::Replace,
        as_mat(a, m, 1),
        as_mat(b, n, 1).transpose(),
        1.0,
        Par::Seq,
    );
    Ok(c)
}

/// Full contraction of two same-shaped tensors.
pub fn dot(a: &Tensor, b: &Tensor) -> Result<f64, TensorError> {
    if a.shape() != b.shape() {
        return Err(incompatible(a, b));
    }
    Ok(a.data().iter().zip(b.data()).map(|(x, y)| x * y).sum())
}

/// Transpose of a matrix.
pub fn transpose(a: &Tensor) -> Result<Tensor, TensorError> {
    expect_rank(a, 2)?;
    let (m, n) = (a.shape()[0], a.shape()[1]);
    let src = a.data();
    let mut data = Vec::with_capacity(m * n);
    // column j of the result is row j of `a`
    for i in 0..m {
        for j in 0..n {
            data.push(src[i + j * m]);
        }
    }
    Tensor::from_vec(data, &[n, m])
}
