//! Integration tests for the finite-difference gradient checker.
//!
//! The checker is itself validated against closed-form derivatives on
//! seeded random inputs.

use approx::assert_relative_eq;
use ndgrad::autodiff::{
    Arg, GradCheckConfig, Primitive, Trace, check, check_grad, ops, quick_check,
};
use ndgrad::error::Result;
use ndgrad::{LeafPath, Tensor, TensorError, Value, differentiate};
use rand::SeedableRng;
use rand::rngs::StdRng;

type Closed = fn(&[f64]) -> Vec<f64>;
type TracedFn = fn(&mut Trace<'_>, &Arg, &[Value]) -> Result<Arg>;

fn sum_exp(tr: &mut Trace<'_>, x: &Arg, _: &[Value]) -> Result<Arg> {
    let y = ops::exp(tr, x)?;
    ops::sum(tr, &y)
}

fn sum_tanh(tr: &mut Trace<'_>, x: &Arg, _: &[Value]) -> Result<Arg> {
    let y = ops::tanh(tr, x)?;
    ops::sum(tr, &y)
}

fn half_norm_sqr(tr: &mut Trace<'_>, x: &Arg, _: &[Value]) -> Result<Arg> {
    let n = ops::dot(tr, x, x)?;
    ops::scale(tr, &n, &Arg::from(0.5))
}

fn mean_square(tr: &mut Trace<'_>, x: &Arg, _: &[Value]) -> Result<Arg> {
    let y = ops::square(tr, x)?;
    ops::mean(tr, &y)
}

fn d_sum_exp(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| v.exp()).collect()
}

fn d_sum_tanh(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| 1.0 - v.tanh().powi(2)).collect()
}

fn d_half_norm_sqr(x: &[f64]) -> Vec<f64> {
    x.to_vec()
}

fn d_mean_square(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| 2.0 * v / x.len() as f64).collect()
}

fn closed_forms() -> Vec<(&'static str, TracedFn, Closed)> {
    vec![
        ("sum(exp(x))", sum_exp as TracedFn, d_sum_exp as Closed),
        ("sum(tanh(x))", sum_tanh as TracedFn, d_sum_tanh as Closed),
        ("|x|^2 / 2", half_norm_sqr as TracedFn, d_half_norm_sqr as Closed),
        ("mean(x^2)", mean_square as TracedFn, d_mean_square as Closed),
    ]
}

#[test]
fn test_driver_matches_closed_forms() {
    let mut rng = StdRng::seed_from_u64(42);
    for (name, f, df) in closed_forms() {
        for _ in 0..5 {
            let x = Tensor::randn_with_rng(&[7], &mut rng);
            let expected = df(x.data());
            let (grad, _) = differentiate(f, &Value::Tensor(x), &[]).unwrap();
            for (g, e) in grad.as_tensor().unwrap().data().iter().zip(&expected) {
                assert_relative_eq!(*g, *e, max_relative = 1e-12, epsilon = 1e-14);
            }
        }
        println!("{name}: closed form ok");
    }
}

#[test_log::test]
fn test_checker_accepts_correct_gradients() {
    let mut rng = StdRng::seed_from_u64(7);
    for (name, f, _) in closed_forms() {
        let x = Value::Tensor(Tensor::uniform_with_rng(&[5], -1.5, 1.5, &mut rng));
        let report = check_grad(f, &x, &[], &GradCheckConfig::default()).unwrap();
        assert!(report.passed(), "{name}: {:?}", report.failures);
        assert_eq!(report.checked, 5);
    }
}

#[test]
fn test_checker_reports_wrong_backward() {
    // correct forward, backward off by a factor of two
    let doubled = Primitive::new(
        "sin_wrong",
        |args| match &args[0] {
            Value::Tensor(t) => Ok(Value::Tensor(ndgrad::operations::apply(t, f64::sin))),
            other => Err(TensorError::InvalidOperation(other.kind().to_string())),
        },
        |g, args, _| {
            let x = args[0].as_tensor().cloned().unwrap_or_else(|| Tensor::zeros(&[]));
            let d = ndgrad::operations::apply(&x, |v| 2.0 * v.cos());
            let g = g.as_tensor().cloned().unwrap_or_else(|| Tensor::ones(d.shape()));
            Ok(vec![Some(Value::Tensor(ndgrad::operations::mul(&g, &d)?))])
        },
    );
    let f = move |tr: &mut Trace<'_>, x: &Arg, _: &[Value]| {
        let y = tr.call(&doubled, &[x.clone()])?;
        ops::sum(tr, &y)
    };

    let input = Value::map([
        ("w", Value::Tensor(Tensor::from_vec(vec![0.1, 0.2, 0.3], &[3]).unwrap())),
    ]);
    let g = |tr: &mut Trace<'_>, input: &Arg, _: &[Value]| {
        let w = input.get("w").cloned().unwrap_or(Arg::from(0.0));
        f(tr, &w, &[])
    };

    let report = check_grad(g, &input, &[], &GradCheckConfig::default()).unwrap();
    assert!(!report.passed());
    assert_eq!(report.checked, 3);
    assert_eq!(report.failures.len(), 3);
    for (i, failure) in report.failures.iter().enumerate() {
        assert_eq!(failure.leaf, LeafPath::from("w"));
        assert_eq!(failure.element, i);
        assert_relative_eq!(failure.analytic, 2.0 * failure.numeric, max_relative = 1e-6);
        assert_relative_eq!(failure.rel_error, 0.5, max_relative = 1e-5);
    }
    assert_relative_eq!(report.max_rel_error, 0.5, max_relative = 1e-5);
}

#[test]
fn test_checker_subset_of_leaves() {
    let input = Value::map([
        ("a", Value::Tensor(Tensor::from_vec(vec![0.3, 0.6], &[2]).unwrap())),
        (
            "layers",
            Value::Seq(vec![Value::Tensor(Tensor::from_vec(vec![1.5], &[1]).unwrap())]),
        ),
    ]);
    let f = |tr: &mut Trace<'_>, input: &Arg, _: &[Value]| {
        let a = input.get("a").cloned().unwrap_or(Arg::from(0.0));
        let b = input
            .get("layers")
            .and_then(|l| l.index(0))
            .cloned()
            .unwrap_or(Arg::from(0.0));
        let s = ops::sum(tr, &a)?;
        let t = ops::sum(tr, &b)?;
        let p = ops::mul(tr, &s, &t)?;
        ops::tanh(tr, &p)
    };

    let all = check_grad(f, &input, &[], &GradCheckConfig::default()).unwrap();
    assert!(all.passed());
    assert_eq!(all.checked, 3);

    let only_layer =
        GradCheckConfig::default().with_leaves([LeafPath::root().key("layers").index(0)]);
    let some = check_grad(f, &input, &[], &only_layer).unwrap();
    assert!(some.passed());
    assert_eq!(some.checked, 1);
}

#[test]
fn test_check_convenience() {
    let x = Value::Tensor(Tensor::from_vec(vec![0.2, 0.4], &[2]).unwrap());
    assert!(check(sum_exp, &x).unwrap());
}

#[test]
fn test_quick_check_on_structured_input() {
    let mut rng = StdRng::seed_from_u64(3);
    let input = Value::map([
        ("W", Value::Tensor(Tensor::randn_with_rng(&[5, 4], &mut rng))),
        ("x", Value::Tensor(Tensor::randn_with_rng(&[4], &mut rng))),
    ]);
    let f = |tr: &mut Trace<'_>, input: &Arg, _: &[Value]| {
        let w = input.get("W").cloned().unwrap_or(Arg::from(0.0));
        let x = input.get("x").cloned().unwrap_or(Arg::from(0.0));
        let h = ops::matvec(tr, &w, &x)?;
        let a = ops::tanh(tr, &h)?;
        ops::sum(tr, &a)
    };
    let result = quick_check(f, &input, &[], &GradCheckConfig::default(), &mut rng).unwrap();
    assert!(result.passed, "{result:?}");
}
