//! Interception: the single entry point through which primitives run.
//!
//! A [`Trace`] is the explicit recording context handed to differentiated
//! code. Calls with no traced argument run the raw primitive and return a raw
//! result without touching the tape. Calls with at least one traced argument
//! are recorded as a new node and return a traced handle to it.

use log::trace;

use super::graph::{ArgRef, Tape, TapeId};
use super::primitive::{Primitive, PrimitiveRegistry};
use super::traced::{Arg, Traced};
use crate::error::{AutodiffError, Result};
use crate::value::Value;

/// Recording context. Holds the active tape, or nothing when detached.
#[derive(Debug)]
pub struct Trace<'t> {
    tape: Option<&'t mut Tape>,
}

impl<'t> Trace<'t> {
    /// Record onto `tape`.
    pub fn new(tape: &'t mut Tape) -> Self {
        Self { tape: Some(tape) }
    }

    /// A context with no tape. Every call runs raw.
    pub fn detached() -> Trace<'static> {
        Trace { tape: None }
    }

    pub fn is_recording(&self) -> bool {
        self.tape.is_some()
    }

    pub fn tape_id(&self) -> Option<TapeId> {
        self.tape.as_ref().map(|t| t.id())
    }

    /// Nodes recorded so far in this run.
    pub fn recorded(&self) -> usize {
        self.tape.as_ref().map_or(0, |t| t.len())
    }

    /// Apply a primitive.
    ///
    /// # Errors
    ///
    /// Operand errors from the primitive come back unchanged as
    /// [`AutodiffError::Operand`]. A traced argument from another tape or an
    /// earlier run gives `ForeignNode`, and one passed to a detached context
    /// gives `Detached`; neither runs the forward.
    pub fn call(&mut self, prim: &Primitive, args: &[Arg]) -> Result<Arg> {
        if !args.iter().any(Arg::is_traced) {
            let values: Vec<Value> = args.iter().map(Arg::unwrap_value).collect();
            return Ok(Arg::Raw(prim.forward(&values)?));
        }

        let Some(tape) = self.tape.as_deref_mut() else {
            return Err(AutodiffError::Detached {
                op: prim.name().to_string(),
            });
        };
        let mut values = Vec::with_capacity(args.len());
        let mut refs = Vec::with_capacity(args.len());
        for arg in args {
            let (value, r) = unwrap_arg(arg, tape.id())?;
            values.push(value);
            refs.push(r);
        }

        let output = prim.forward(&values)?;
        let node = tape.record(prim, values, refs, output.clone())?;
        trace!("recorded {} as node {}", prim.name(), node);
        Ok(Arg::Traced(Traced::new(node, tape.id(), output)))
    }

    /// Apply a registered primitive by name.
    pub fn call_named(
        &mut self,
        registry: &PrimitiveRegistry,
        name: &str,
        args: &[Arg],
    ) -> Result<Arg> {
        let prim = registry.get(name)?;
        self.call(prim, args)
    }

    /// Record `value` as a root and hand back its traced handle. Detached
    /// contexts return the value raw.
    pub(crate) fn root(&mut self, value: Value) -> Arg {
        match self.tape.as_deref_mut() {
            Some(tape) => {
                let node = tape.record_root(value.clone());
                Arg::Traced(Traced::new(node, tape.id(), value))
            }
            None => Arg::Raw(value),
        }
    }
}

/// Raw value and structural trace reference of one argument.
fn unwrap_arg(arg: &Arg, tape: TapeId) -> Result<(Value, ArgRef)> {
    match arg {
        Arg::Raw(v) => Ok((v.clone(), ArgRef::Const)),
        Arg::Traced(t) if t.tape_id() != tape => Err(AutodiffError::ForeignNode {
            expected: tape,
            found: t.tape_id(),
        }),
        Arg::Traced(t) => Ok((t.value().clone(), ArgRef::Node(t.node_id()))),
        Arg::Map(m) => {
            let mut values = std::collections::BTreeMap::new();
            let mut refs = std::collections::BTreeMap::new();
            for (k, a) in m {
                let (v, r) = unwrap_arg(a, tape)?;
                values.insert(k.clone(), v);
                refs.insert(k.clone(), r);
            }
            let r = if refs.values().all(ArgRef::is_const) {
                ArgRef::Const
            } else {
                ArgRef::Map(refs)
            };
            Ok((Value::Map(values), r))
        }
        Arg::Seq(s) => {
            let mut values = Vec::with_capacity(s.len());
            let mut refs = Vec::with_capacity(s.len());
            for a in s {
                let (v, r) = unwrap_arg(a, tape)?;
                values.push(v);
                refs.push(r);
            }
            let r = if refs.iter().all(ArgRef::is_const) {
                ArgRef::Const
            } else {
                ArgRef::Seq(refs)
            };
            Ok((Value::Seq(values), r))
        }
    }
}
