//! Independent differentiation contexts on separate threads.

use approx::assert_relative_eq;
use ndgrad::autodiff::{Arg, Grad, Trace, ops};
use ndgrad::error::Result;
use ndgrad::{Tensor, Value};

fn weighted_sum(tr: &mut Trace<'_>, x: &Arg, aux: &[Value]) -> Result<Arg> {
    let w = Arg::from(aux[0].clone());
    let y = ops::mul(tr, x, &w)?;
    let z = ops::tanh(tr, &y)?;
    ops::sum(tr, &z)
}

#[test]
fn test_threads_do_not_share_tapes() {
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (1..=8)
            .map(|k| {
                s.spawn(move || {
                    let scale = k as f64 * 0.1;
                    let x = Value::Tensor(Tensor::full(&[16], scale));
                    let w = Value::Tensor(Tensor::full(&[16], 2.0));
                    let mut grad = Grad::new(weighted_sum);
                    let mut last = None;
                    for _ in 0..20 {
                        last = Some(grad.call(&x, std::slice::from_ref(&w)).unwrap());
                    }
                    assert_eq!(grad.stats().mismatched, 0);
                    (scale, last.unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 8);
    for (scale, (grad, out)) in results {
        let t = (2.0 * scale).tanh();
        assert_relative_eq!(out, 16.0 * t, max_relative = 1e-12);
        for &g in grad.as_tensor().unwrap().data() {
            assert_relative_eq!(g, 2.0 * (1.0 - t * t), max_relative = 1e-12);
        }
    }
}

#[test]
fn test_grad_moves_between_threads() {
    let mut grad = Grad::new(weighted_sum);
    let x = Value::Tensor(Tensor::ones(&[3]));
    let w = Value::Tensor(Tensor::zeros(&[3]));
    grad.call(&x, std::slice::from_ref(&w)).unwrap();
    let fingerprint = grad.fingerprint();

    let grad = std::thread::spawn(move || {
        let mut grad = grad;
        grad.call(&x, std::slice::from_ref(&w)).unwrap();
        grad
    })
    .join()
    .unwrap();
    assert_eq!(grad.fingerprint(), fingerprint);
    assert_eq!(grad.stats().fresh, 0);
}
