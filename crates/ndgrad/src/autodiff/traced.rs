//! Arguments as seen by differentiated code.
//!
//! Every argument is a tagged variant: a raw value, a traced handle, or a
//! container of further arguments. Primitives never see these; the trace
//! unwraps them into raw values first.

use std::collections::BTreeMap;

use super::graph::{NodeId, TapeId};
use crate::tensor::Tensor;
use crate::value::Value;

/// A value paired with the tape node that produced it.
#[derive(Debug, Clone)]
pub struct Traced {
    node: NodeId,
    tape: TapeId,
    value: Value,
}

impl Traced {
    pub(crate) fn new(node: NodeId, tape: TapeId, value: Value) -> Self {
        Self { node, tape, value }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn tape_id(&self) -> TapeId {
        self.tape
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// An argument passed to a primitive.
#[derive(Debug, Clone)]
pub enum Arg {
    Raw(Value),
    Traced(Traced),
    Map(BTreeMap<String, Arg>),
    Seq(Vec<Arg>),
}

impl Arg {
    /// Build a mapping argument from `(key, arg)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Arg)>,
    {
        Arg::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Arg> {
        match self {
            Arg::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Arg> {
        match self {
            Arg::Seq(s) => s.get(i),
            _ => None,
        }
    }

    /// Whether a traced handle occurs anywhere inside.
    pub fn is_traced(&self) -> bool {
        match self {
            Arg::Raw(_) => false,
            Arg::Traced(_) => true,
            Arg::Map(m) => m.values().any(Arg::is_traced),
            Arg::Seq(s) => s.iter().any(Arg::is_traced),
        }
    }

    /// The underlying value of a leaf argument.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Arg::Raw(v) => Some(v),
            Arg::Traced(t) => Some(t.value()),
            _ => None,
        }
    }

    pub fn as_traced(&self) -> Option<&Traced> {
        match self {
            Arg::Traced(t) => Some(t),
            _ => None,
        }
    }

    /// Scalar view of a scalar or one-element tensor leaf.
    pub fn to_f64(&self) -> Option<f64> {
        self.value().and_then(Value::to_f64)
    }

    /// Strip every trace, rebuilding the plain value.
    pub fn unwrap_value(&self) -> Value {
        match self {
            Arg::Raw(v) => v.clone(),
            Arg::Traced(t) => t.value.clone(),
            Arg::Map(m) => Value::Map(m.iter().map(|(k, a)| (k.clone(), a.unwrap_value())).collect()),
            Arg::Seq(s) => Value::Seq(s.iter().map(Arg::unwrap_value).collect()),
        }
    }

    /// Same data with no connection to any tape.
    pub fn detach(&self) -> Arg {
        Arg::from(self.unwrap_value())
    }
}

/// Containers become `Arg` containers, so `get` and `index` reach into them.
impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        match v {
            Value::Map(m) => Arg::Map(m.into_iter().map(|(k, v)| (k, Arg::from(v))).collect()),
            Value::Seq(s) => Arg::Seq(s.into_iter().map(Arg::from).collect()),
            other => Arg::Raw(other),
        }
    }
}

impl From<Traced> for Arg {
    fn from(t: Traced) -> Self {
        Arg::Traced(t)
    }
}

impl From<Tensor> for Arg {
    fn from(t: Tensor) -> Self {
        Arg::Raw(Value::Tensor(t))
    }
}

impl From<f64> for Arg {
    fn from(x: f64) -> Self {
        Arg::Raw(Value::Scalar(x))
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(s: Vec<Arg>) -> Self {
        Arg::Seq(s)
    }
}
