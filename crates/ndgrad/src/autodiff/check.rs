//! Finite-difference gradient checking.
//!
//! Every element of every checked leaf is perturbed by `±epsilon` and the
//! centered difference `(f(x + ε) - f(x - ε)) / 2ε` is compared against the
//! analytic gradient. Perturbed evaluations run on a detached trace, so they
//! never touch a tape.

use std::fmt;

use log::debug;
use rand::Rng;

use super::grad::Grad;
use super::trace::Trace;
use super::traced::Arg;
use crate::error::{AutodiffError, Result};
use crate::operations::{axpy, dot};
use crate::tensor::Tensor;
use crate::value::{LeafPath, Value};

/// Tolerances and scope of a gradient check.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradCheckConfig {
    /// Perturbation size.
    pub epsilon: f64,
    /// Relative tolerance.
    pub tolerance: f64,
    /// Absolute tolerance, used for gradients near zero where the relative
    /// error is meaningless.
    pub abs_tolerance: f64,
    /// Leaves to check; `None` checks every tensor leaf.
    pub leaves: Option<Vec<LeafPath>>,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            tolerance: 1e-5,
            abs_tolerance: 1e-6,
            leaves: None,
        }
    }
}

impl GradCheckConfig {
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    /// Restrict the check to the given leaves.
    pub fn with_leaves<I, P>(mut self, leaves: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LeafPath>,
    {
        self.leaves = Some(leaves.into_iter().map(Into::into).collect());
        self
    }

    fn accepts(&self, abs_error: f64, rel_error: f64) -> bool {
        abs_error <= self.abs_tolerance || rel_error <= self.tolerance
    }
}

/// One element whose analytic and numeric gradients disagree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradCheckFailure {
    pub leaf: LeafPath,
    /// Linear (column-major) index inside the leaf.
    pub element: usize,
    pub analytic: f64,
    pub numeric: f64,
    pub abs_error: f64,
    pub rel_error: f64,
}

impl fmt::Display for GradCheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: analytic {:e}, numeric {:e} (abs {:e}, rel {:e})",
            self.leaf, self.element, self.analytic, self.numeric, self.abs_error, self.rel_error
        )
    }
}

/// Outcome of [`check_grad`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradCheckReport {
    /// Elements compared.
    pub checked: usize,
    pub max_abs_error: f64,
    pub max_rel_error: f64,
    pub failures: Vec<GradCheckFailure>,
}

impl GradCheckReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(
        &mut self,
        leaf: &LeafPath,
        element: usize,
        analytic: f64,
        numeric: f64,
        config: &GradCheckConfig,
    ) {
        let (abs_error, rel_error) = errors(analytic, numeric);
        self.checked += 1;
        self.max_abs_error = self.max_abs_error.max(abs_error);
        self.max_rel_error = self.max_rel_error.max(rel_error);
        if !config.accepts(abs_error, rel_error) {
            self.failures.push(GradCheckFailure {
                leaf: leaf.clone(),
                element,
                analytic,
                numeric,
                abs_error,
                rel_error,
            });
        }
    }
}

/// Outcome of [`quick_check`]: one directional derivative.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectionalCheck {
    pub analytic: f64,
    pub numeric: f64,
    pub abs_error: f64,
    pub rel_error: f64,
    pub passed: bool,
}

fn errors(analytic: f64, numeric: f64) -> (f64, f64) {
    let abs_error = (analytic - numeric).abs();
    let scale = analytic.abs().max(numeric.abs());
    let rel_error = if scale > 0.0 { abs_error / scale } else { 0.0 };
    (abs_error, rel_error)
}

/// Compare the analytic gradient of `f` at `input` with finite differences.
///
/// # Errors
///
/// `UnknownLeaf` when the config names a path with no tensor leaf, and any
/// error raised by `f` itself.
///
/// # Example
///
/// ```
/// use ndgrad::{Tensor, Value};
/// use ndgrad::autodiff::{GradCheckConfig, check_grad, ops};
///
/// let x = Value::Tensor(Tensor::from_vec(vec![0.1, 0.5, -0.3], &[3]).unwrap());
/// let report = check_grad(
///     |tr, x, _| {
///         let y = ops::tanh(tr, x)?;
///         ops::sum(tr, &y)
///     },
///     &x,
///     &[],
///     &GradCheckConfig::default(),
/// )
/// .unwrap();
/// assert!(report.passed());
/// assert_eq!(report.checked, 3);
/// ```
pub fn check_grad<F>(
    f: F,
    input: &Value,
    aux: &[Value],
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    let leaves = selected_leaves(input, config)?;
    let (analytic, _) = Grad::new(&f).call(input, aux)?;

    let mut probe = input.clone();
    let mut report = GradCheckReport::default();
    for path in &leaves {
        let len = input.leaf(path).map_or(0, Tensor::len);
        let grad = analytic.leaf(path);
        for element in 0..len {
            let numeric = central_difference(&f, &mut probe, aux, path, element, config.epsilon)?;
            let analytic = grad
                .and_then(|g| g.get_linear(element))
                .copied()
                .unwrap_or(0.0);
            report.record(path, element, analytic, numeric, config);
        }
    }

    debug!(
        "gradient check: {} element(s) over {} leaf/leaves, {} failure(s), max abs {:e}, max rel {:e}",
        report.checked,
        leaves.len(),
        report.failures.len(),
        report.max_abs_error,
        report.max_rel_error
    );
    Ok(report)
}

/// [`check_grad`] with default tolerances and no auxiliary values.
pub fn check<F>(f: F, input: &Value) -> Result<bool>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    Ok(check_grad(f, input, &[], &GradCheckConfig::default())?.passed())
}

/// Directional check along one random normal direction `v` over the checked
/// leaves: compares `<grad, v>` with `(f(x + εv) - f(x - εv)) / 2ε`.
///
/// Costs two evaluations regardless of input size.
pub fn quick_check<F, R>(
    f: F,
    input: &Value,
    aux: &[Value],
    config: &GradCheckConfig,
    rng: &mut R,
) -> Result<DirectionalCheck>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
    R: Rng,
{
    let leaves = selected_leaves(input, config)?;
    let (analytic_grad, _) = Grad::new(&f).call(input, aux)?;

    let mut directions = Vec::with_capacity(leaves.len());
    let mut analytic = 0.0;
    for path in leaves {
        let shape = input.leaf(&path).map(|t| t.shape().to_vec()).unwrap_or_default();
        let v = Tensor::randn_with_rng(&shape, rng);
        if let Some(g) = analytic_grad.leaf(&path) {
            analytic += dot(g, &v)?;
        }
        directions.push((path, v));
    }

    let f_plus = evaluate(&f, &shifted(input, &directions, config.epsilon)?, aux)?;
    let f_minus = evaluate(&f, &shifted(input, &directions, -config.epsilon)?, aux)?;
    let numeric = (f_plus - f_minus) / (2.0 * config.epsilon);

    let (abs_error, rel_error) = errors(analytic, numeric);
    let passed = config.accepts(abs_error, rel_error);
    debug!(
        "directional check: analytic {:e}, numeric {:e}, passed {}",
        analytic, numeric, passed
    );
    Ok(DirectionalCheck {
        analytic,
        numeric,
        abs_error,
        rel_error,
        passed,
    })
}

fn selected_leaves(input: &Value, config: &GradCheckConfig) -> Result<Vec<LeafPath>> {
    match &config.leaves {
        Some(paths) => {
            if let Some(missing) = paths.iter().find(|p| input.leaf(p).is_none()) {
                return Err(AutodiffError::UnknownLeaf(missing.to_string()));
            }
            Ok(paths.clone())
        }
        None => Ok(input.leaves().into_iter().map(|(p, _)| p).collect()),
    }
}

/// Evaluate `f` raw, with no tape.
fn evaluate<F>(f: &F, input: &Value, aux: &[Value]) -> Result<f64>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    let out = f(&mut Trace::detached(), &Arg::from(input.clone()), aux)?.unwrap_value();
    out.to_f64().ok_or_else(|| AutodiffError::NonScalarOutput(out.kind().to_string()))
}

fn central_difference<F>(
    f: &F,
    probe: &mut Value,
    aux: &[Value],
    path: &LeafPath,
    element: usize,
    eps: f64,
) -> Result<f64>
where
    F: Fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>,
{
    let x0 = set_element(probe, path, element, None)?;
    set_element(probe, path, element, Some(x0 + eps))?;
    let f_plus = evaluate(f, probe, aux);
    set_element(probe, path, element, Some(x0 - eps))?;
    let f_minus = evaluate(f, probe, aux);
    set_element(probe, path, element, Some(x0))?;
    Ok((f_plus? - f_minus?) / (2.0 * eps))
}

/// Read an element, optionally overwriting it; returns the previous value.
fn set_element(probe: &mut Value, path: &LeafPath, element: usize, value: Option<f64>) -> Result<f64> {
    let leaf = probe
        .leaf_mut(path)
        .ok_or_else(|| AutodiffError::UnknownLeaf(path.to_string()))?;
    let old = leaf.data()[element];
    if let Some(v) = value {
        leaf.data_mut()[element] = v;
    }
    Ok(old)
}

fn shifted(input: &Value, directions: &[(LeafPath, Tensor)], step: f64) -> Result<Value> {
    let mut out = input.clone();
    for (path, v) in directions {
        let leaf = out
            .leaf_mut(path)
            .ok_or_else(|| AutodiffError::UnknownLeaf(path.to_string()))?;
        axpy(step, v, leaf)?;
    }
    Ok(out)
}
