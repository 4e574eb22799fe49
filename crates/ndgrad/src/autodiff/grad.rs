//! The differentiation driver.
//!
//! ```text
//! input ──attach_roots──► Arg ──f──► output ──sweep──► tape grads ──extract──► gradient
//! ```
//!
//! A [`Grad`] owns its tape, so repeated calls recycle the previous run's
//! slots. The tape is not shared; independent drivers may run on different
//! threads at once.

use log::debug;

use super::backward::{SweepReport, sweep};
use super::gradients::{attach_roots, extract_gradients};
use super::graph::{Fingerprint, RecyclePolicy, RecycleStats, Tape};
use super::trace::Trace;
use super::traced::Arg;
use crate::error::{AutodiffError, Result};
use crate::value::Value;

/// Differentiate a scalar-valued `f` at `input` once.
///
/// `f` receives the recording context, the differentiable input with every
/// tensor leaf traced, and the non-differentiable `aux` values. Returns the
/// gradient (shaped like `input`) and the output value.
///
/// # Example
///
/// ```
/// use ndgrad::{Tensor, Value, differentiate};
/// use ndgrad::autodiff::ops;
///
/// let x = Value::Tensor(Tensor::full(&[3], 2.0));
/// let (grad, out) = differentiate(
///     |tr, x, _aux| {
///         let sq = ops::square(tr, x)?;
///         ops::sum(tr, &sq)
///     },
///     &x,
///     &[],
/// )
/// .unwrap();
/// assert_eq!(out, 12.0);
/// assert_eq!(grad.as_tensor().unwrap().data(), &[4.0, 4.0, 4.0]);
/// ```
pub fn differentiate<F>(f: F, input: &Value, aux: &[Value]) -> Result<(Value, f64)>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    Grad::new(f).call(input, aux)
}

/// [`differentiate`] with the output first.
pub fn value_and_grad<F>(f: F, input: &Value, aux: &[Value]) -> Result<(f64, Value)>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    let (grad, out) = differentiate(f, input, aux)?;
    Ok((out, grad))
}

/// A reusable gradient of `f`.
///
/// Created once at the call site and called many times. Structurally
/// identical runs recycle every tape slot; a run that diverges drops the
/// slots from the first difference on.
#[derive(Debug)]
pub struct Grad<F> {
    f: F,
    tape: Tape,
    last_sweep: Option<SweepReport>,
}

impl<F> Grad<F>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    pub fn new(f: F) -> Self {
        Self::with_policy(f, RecyclePolicy::default())
    }

    pub fn with_policy(f: F, policy: RecyclePolicy) -> Self {
        Self {
            f,
            tape: Tape::with_policy(policy),
            last_sweep: None,
        }
    }

    /// Evaluate `f` at `input` and return `(gradient, output)`.
    ///
    /// # Errors
    ///
    /// Whatever `f` or a primitive's backward function raises, unchanged, or
    /// `NonScalarOutput` when `f` returns something other than a scalar or a
    /// one-element tensor. After any error the tape is cleared, so the next
    /// call starts from fresh slots.
    pub fn call(&mut self, input: &Value, aux: &[Value]) -> Result<(Value, f64)> {
        match self.run(input, aux) {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!("tape {}: run failed ({}); invalidating", self.tape.id().get(), e);
                self.tape.invalidate();
                self.last_sweep = None;
                Err(e)
            }
        }
    }

    fn run(&mut self, input: &Value, aux: &[Value]) -> Result<(Value, f64)> {
        self.tape.begin();
        let (roots, out) = {
            let mut trace = Trace::new(&mut self.tape);
            let roots = attach_roots(&mut trace, input);
            let out = (self.f)(&mut trace, &roots, aux)?;
            (roots, out)
        };
        self.tape.finish();

        let stats = self.tape.stats();
        debug!(
            "tape {}: recorded {} node(s), {} recycled, {} fresh, {} mismatched",
            self.tape.id().get(),
            self.tape.len(),
            stats.recycled,
            stats.fresh,
            stats.mismatched
        );

        let (node, value) = match out {
            Arg::Traced(t) => {
                if t.tape_id() != self.tape.id() {
                    return Err(AutodiffError::ForeignNode {
                        expected: self.tape.id(),
                        found: t.tape_id(),
                    });
                }
                (Some(t.node_id()), t.into_value())
            }
            Arg::Raw(v) => (None, v),
            other => return Err(AutodiffError::NonScalarOutput(describe(&other))),
        };
        let output = value
            .to_f64()
            .ok_or_else(|| AutodiffError::NonScalarOutput(describe_value(&value)))?;

        self.last_sweep = match node {
            Some(node) => {
                let seed = value
                    .ones_like()
                    .ok_or_else(|| AutodiffError::NonScalarOutput(describe_value(&value)))?;
                Some(sweep(&mut self.tape, node, seed)?)
            }
            None => {
                debug!("output does not depend on the input; gradient is zero");
                None
            }
        };

        Ok((extract_gradients(&self.tape, &roots), output))
    }

    /// Structural fingerprint of the last successful run.
    pub fn fingerprint(&self) -> Fingerprint {
        self.tape.fingerprint()
    }

    pub fn stats(&self) -> RecycleStats {
        self.tape.stats()
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// The sweep of the last run, if the output was traced.
    pub fn last_sweep(&self) -> Option<&SweepReport> {
        self.last_sweep.as_ref()
    }
}

fn describe(arg: &Arg) -> String {
    match arg {
        Arg::Map(_) => "map".to_string(),
        Arg::Seq(_) => "sequence".to_string(),
        Arg::Raw(v) => describe_value(v),
        Arg::Traced(t) => describe_value(t.value()),
    }
}

fn describe_value(v: &Value) -> String {
    match v {
        Value::Tensor(t) => format!("tensor of shape {:?}", t.shape()),
        other => other.kind().to_string(),
    }
}
