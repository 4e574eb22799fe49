//! Dense, reference-counted storage with copy-on-write semantics.

use std::sync::Arc;

/// Dense storage - contiguous `f64` elements in column-major order.
///
/// Cloning is cheap: the buffer is shared until one of the owners asks for
/// mutable access, at which point that owner gets a private copy. Values
/// recorded on a tape therefore share memory with the values user code holds.
#[derive(Debug, Clone)]
pub struct Dense {
    data: Arc<Vec<f64>>,
}

impl Dense {
    /// Zero-initialized storage of the given length.
    pub fn zeros(len: usize) -> Self {
        Self::from_vec(vec![0.0; len])
    }

    /// Storage taking ownership of `data`.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable access, detaching from any other owner first.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Another handle to the same buffer.
    #[inline]
    pub fn view(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }

    /// Whether both storages point at the same buffer.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Whether another handle to this buffer exists.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Consume the storage, copying only if the buffer is shared.
    pub fn into_vec(self) -> Vec<f64> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl PartialEq for Dense {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage_with(other) || self.data == other.data
    }
}

impl std::ops::Index<usize> for Dense {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.data[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let d = Dense::zeros(5);
        assert_eq!(d.len(), 5);
        assert!(d.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_view_shares_until_write() {
        let a = Dense::from_vec(vec![1.0, 2.0, 3.0]);
        let mut b = a.view();
        assert!(a.shares_storage_with(&b));
        assert!(a.is_shared());

        b.as_mut_slice()[0] = 10.0;
        assert!(!a.shares_storage_with(&b));
        assert_eq!(a[0], 1.0);
        assert_eq!(b[0], 10.0);
    }

    #[test]
    fn test_into_vec_shared() {
        let a = Dense::from_vec(vec![1.0, 2.0]);
        let b = a.view();
        assert_eq!(b.into_vec(), vec![1.0, 2.0]);
        assert_eq!(a.as_slice(), &[1.0, 2.0]);
    }
}
