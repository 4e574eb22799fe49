//! Primitive operations and their registry.
//!
//! A primitive is a `{forward, backward}` pair. The engine never looks inside
//! either function: forward maps raw argument values to a raw result, and
//! backward maps `(upstream gradient, recorded arguments, recorded result)` to
//! one optional contribution per argument.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AutodiffError, TensorError};
use crate::value::Value;

/// Raw operation: argument values in, result value out.
pub type ForwardFn = dyn Fn(&[Value]) -> Result<Value, TensorError> + Send + Sync;

/// Vector-Jacobian product of a primitive.
///
/// Called as `backward(grad_output, args, output)`. Must return exactly one
/// entry per argument, `None` for arguments that do not support
/// differentiation.
pub type BackwardFn =
    dyn Fn(&Value, &[Value], &Value) -> Result<Vec<Option<Value>>, TensorError> + Send + Sync;

/// A registered operation.
///
/// Cloning is cheap; the name is the operation's identity when tapes compare
/// recordings.
#[derive(Clone)]
pub struct Primitive {
    name: Arc<str>,
    forward: Arc<ForwardFn>,
    backward: Option<Arc<BackwardFn>>,
}

impl Primitive {
    /// A differentiable primitive.
    pub fn new<F, B>(name: &str, forward: F, backward: B) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, TensorError> + Send + Sync + 'static,
        B: Fn(&Value, &[Value], &Value) -> Result<Vec<Option<Value>>, TensorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name),
            forward: Arc::new(forward),
            backward: Some(Arc::new(backward)),
        }
    }

    /// A primitive with no backward function. Its nodes are recorded but
    /// pass no gradient to their operands.
    pub fn non_differentiable<F>(name: &str, forward: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, TensorError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            forward: Arc::new(forward),
            backward: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_differentiable(&self) -> bool {
        self.backward.is_some()
    }

    /// Whether two primitives are the same operation.
    pub fn same_op(&self, other: &Primitive) -> bool {
        self.name == other.name
    }

    /// Run the raw operation.
    pub fn forward(&self, args: &[Value]) -> Result<Value, TensorError> {
        (self.forward)(args)
    }

    /// Run the backward function, or `None` if the primitive has none.
    pub fn backward(
        &self,
        grad_output: &Value,
        args: &[Value],
        output: &Value,
    ) -> Option<Result<Vec<Option<Value>>, TensorError>> {
        self.backward
            .as_ref()
            .map(|backward| backward(grad_output, args, output))
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("differentiable", &self.is_differentiable())
            .finish()
    }
}

/// Name-keyed table of primitives supplied by operation libraries.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    prims: BTreeMap<String, Primitive>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primitive.
    ///
    /// # Errors
    ///
    /// `DuplicatePrimitive` if the name is taken; names are operation
    /// identities, so two primitives may not share one.
    pub fn register(&mut self, prim: Primitive) -> Result<(), AutodiffError> {
        if self.prims.contains_key(prim.name()) {
            return Err(AutodiffError::DuplicatePrimitive(prim.name().to_string()));
        }
        log::trace!("registered primitive `{}`", prim.name());
        self.prims.insert(prim.name().to_string(), prim);
        Ok(())
    }

    /// Insert a primitive whose name is known to be free.
    pub(crate) fn insert_unique(&mut self, prim: Primitive) {
        debug_assert!(!self.contains(prim.name()));
        self.prims.insert(prim.name().to_string(), prim);
    }

    /// Look up a primitive by name.
    pub fn get(&self, name: &str) -> Result<&Primitive, AutodiffError> {
        self.prims
            .get(name)
            .ok_or_else(|| AutodiffError::UnknownPrimitive(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prims.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prims.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> Primitive {
        Primitive::new(
            "double",
            |args| Ok(Value::Scalar(2.0 * args[0].to_f64().unwrap_or_default())),
            |g, _args, _out| Ok(vec![Some(Value::Scalar(2.0 * g.to_f64().unwrap_or_default()))]),
        )
    }

    #[test]
    fn test_forward_and_backward() {
        let p = double();
        assert_eq!(p.forward(&[Value::Scalar(3.0)]).unwrap(), Value::Scalar(6.0));
        let grads = p
            .backward(&Value::Scalar(1.0), &[Value::Scalar(3.0)], &Value::Scalar(6.0))
            .unwrap()
            .unwrap();
        assert_eq!(grads, vec![Some(Value::Scalar(2.0))]);
    }

    #[test]
    fn test_non_differentiable_has_no_backward() {
        let p = Primitive::non_differentiable("floor", |args| {
            Ok(Value::Scalar(args[0].to_f64().unwrap_or_default().floor()))
        });
        assert!(!p.is_differentiable());
        assert!(p.backward(&Value::Scalar(1.0), &[], &Value::Scalar(0.0)).is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double()).unwrap();
        let err = registry.register(double()).unwrap_err();
        assert!(matches!(err, AutodiffError::DuplicatePrimitive(name) if name == "double"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double()).unwrap();
        assert!(registry.contains("double"));
        assert!(registry.get("double").unwrap().same_op(&double()));
        assert!(matches!(
            registry.get("triple"),
            Err(AutodiffError::UnknownPrimitive(_))
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double"]);
    }
}
