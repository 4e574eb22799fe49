//! The value model: scalars, tensors, and nested containers of them.
//!
//! ```text
//! Value
//! ├── Scalar(f64)
//! ├── Tensor(Tensor)          <- the only leaves that become roots
//! ├── Bool / Str              <- carried through untouched
//! ├── Map(BTreeMap<String, Value>)
//! └── Seq(Vec<Value>)
//! ```
//!
//! The engine needs exactly three things from a value: its shape, a zero of
//! the same shape, and addition. All three live here so the tape never does
//! arithmetic of its own.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::TensorError;
use crate::operations::{add, axpy};
use crate::tensor::Tensor;

/// A value flowing through differentiated code.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Tensor(Tensor),
    Bool(bool),
    Str(String),
    Map(BTreeMap<String, Value>),
    Seq(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Tensor(_) => "tensor",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Map(_) => "map",
            Value::Seq(_) => "sequence",
        }
    }

    /// Build a mapping from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shape of a numeric value; scalars have the empty shape.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Value::Scalar(_) => Some(&[]),
            Value::Tensor(t) => Some(t.shape()),
            _ => None,
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Value::Tensor(_))
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    /// Scalar view of a scalar or one-element tensor.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Tensor(t) => t.item(),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Seq(s) => s.get(i),
            _ => None,
        }
    }

    /// Zero of matching shape, recursing through containers.
    ///
    /// Non-numeric leaves are copied as they are.
    pub fn zeros_like(&self) -> Value {
        match self {
            Value::Scalar(_) => Value::Scalar(0.0),
            Value::Tensor(t) => Value::Tensor(t.zeros_like()),
            Value::Map(m) => Value::Map(m.iter().map(|(k, v)| (k.clone(), v.zeros_like())).collect()),
            Value::Seq(s) => Value::Seq(s.iter().map(Value::zeros_like).collect()),
            other => other.clone(),
        }
    }

    /// Multiplicative identity of matching shape, used to seed the backward
    /// pass. `None` for non-numeric values.
    pub fn ones_like(&self) -> Option<Value> {
        match self {
            Value::Scalar(_) => Some(Value::Scalar(1.0)),
            Value::Tensor(t) => Some(Value::Tensor(Tensor::ones(t.shape()))),
            _ => None,
        }
    }

    /// `self + other`, structurally.
    ///
    /// # Errors
    ///
    /// Fails when the two values disagree in kind or shape.
    pub fn add(&self, other: &Value) -> Result<Value, TensorError> {
        let mut out = self.clone();
        out.accumulate(other.clone())?;
        Ok(out)
    }

    /// `self += other`, in place.
    ///
    /// A scalar and a one-element tensor may be mixed; the result keeps the
    /// tensor's shape. Mapping entries missing from `self` are inserted.
    pub fn accumulate(&mut self, other: Value) -> Result<(), TensorError> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => *a += b,
            (Value::Tensor(a), Value::Tensor(b)) => axpy(1.0, &b, a)?,
            (Value::Tensor(a), Value::Scalar(b)) if a.len() == 1 => a.data_mut()[0] += b,
            (this @ Value::Scalar(_), Value::Tensor(b)) if b.len() == 1 => {
                let a = this.to_f64().unwrap_or_default();
                let mut b = b;
                b.data_mut()[0] += a;
                *this = Value::Tensor(b);
            }
            (Value::Map(a), Value::Map(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(slot) => slot.accumulate(value)?,
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Seq(a), Value::Seq(b)) => {
                if a.len() != b.len() {
                    return Err(TensorError::ShapeMismatch {
                        expected: a.len(),
                        actual: b.len(),
                    });
                }
                for (slot, value) in a.iter_mut().zip(b) {
                    slot.accumulate(value)?;
                }
            }
            (Value::Bool(a), Value::Bool(b)) if *a == b => {}
            (Value::Str(a), Value::Str(b)) if *a == b => {}
            (this, other) => {
                return Err(TensorError::TypeMismatch {
                    op: "accumulate".to_string(),
                    expected: this.kind(),
                    actual: other.kind(),
                });
            }
        }
        Ok(())
    }

    /// All tensor leaves with their paths, in structural order.
    pub fn leaves(&self) -> Vec<(LeafPath, &Tensor)> {
        let mut out = Vec::new();
        collect_leaves(self, &mut LeafPath::root(), &mut out);
        out
    }

    /// The tensor leaf at `path`.
    pub fn leaf(&self, path: &LeafPath) -> Option<&Tensor> {
        path.0
            .iter()
            .try_fold(self, |v, seg| match seg {
                PathSegment::Key(k) => v.get(k),
                PathSegment::Index(i) => v.index(*i),
            })?
            .as_tensor()
    }

    /// Mutable access to the tensor leaf at `path`.
    pub fn leaf_mut(&mut self, path: &LeafPath) -> Option<&mut Tensor> {
        let mut v = self;
        for seg in &path.0 {
            v = match (v, seg) {
                (Value::Map(m), PathSegment::Key(k)) => m.get_mut(k)?,
                (Value::Seq(s), PathSegment::Index(i)) => s.get_mut(*i)?,
                _ => return None,
            };
        }
        match v {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

fn collect_leaves<'a>(v: &'a Value, path: &mut LeafPath, out: &mut Vec<(LeafPath, &'a Tensor)>) {
    match v {
        Value::Tensor(t) => out.push((path.clone(), t)),
        Value::Map(m) => {
            for (k, child) in m {
                path.0.push(PathSegment::Key(k.clone()));
                collect_leaves(child, path, out);
                path.0.pop();
            }
        }
        Value::Seq(s) => {
            for (i, child) in s.iter().enumerate() {
                path.0.push(PathSegment::Index(i));
                collect_leaves(child, path, out);
                path.0.pop();
            }
        }
        _ => {}
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(s: Vec<Value>) -> Self {
        Value::Seq(s)
    }
}

/// One step into a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Address of a leaf inside a nested value, e.g. `layers/0/w`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeafPath(Vec<PathSegment>);

impl LeafPath {
    /// The empty path: the value itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend with a mapping key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    /// Extend with a sequence position.
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(PathSegment::Index(i));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for LeafPath {
    fn from(key: &str) -> Self {
        LeafPath::root().key(key)
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match seg {
                PathSegment::Key(k) => f.write_str(k)?,
                PathSegment::Index(n) => write!(f, "{n}")?,
            }
        }
        Ok(())
    }
}
