//! Backward sweep over a recorded tape.

use log::trace;

use super::graph::{ArgRef, NodeId, Tape, TapeNode};
use crate::error::{AutodiffError, Result, TensorError};
use crate::value::Value;

/// What a sweep touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Nodes whose backward function ran, in the order it ran.
    pub visited: Vec<NodeId>,
    /// Gradient contributions delivered to earlier nodes.
    pub edges: usize,
}

/// Propagate `seed` from `output` back to the roots.
///
/// Nodes are visited once each, from `output` down to index 0. A node that
/// never received a gradient, is a root, or has no backward function is
/// skipped. Contributions are added into whatever the target already holds.
///
/// # Errors
///
/// Operand errors raised by a backward function, `ArityMismatch` when one
/// returns the wrong number of contributions, and `InvalidReference` if
/// `output` is not on the tape.
pub fn sweep(tape: &mut Tape, output: NodeId, seed: Value) -> Result<SweepReport> {
    let nodes = tape.nodes_mut();
    let last = output.index();
    if last >= nodes.len() {
        return Err(AutodiffError::InvalidReference {
            node: nodes.len(),
            target: last,
        });
    }
    nodes[last].grad = Some(seed);

    let mut report = SweepReport::default();
    for i in (0..=last).rev() {
        let (earlier, rest) = nodes.split_at_mut(i);
        let node = &rest[0];
        let (Some(grad), Some(op)) = (node.grad.as_ref(), node.op()) else {
            continue;
        };
        let Some(contributions) = op.backward(grad, node.args(), node.value()) else {
            continue;
        };
        let contributions = contributions?;
        if contributions.len() != node.arity() {
            return Err(AutodiffError::ArityMismatch {
                op: op.name().to_string(),
                expected: node.arity(),
                actual: contributions.len(),
            });
        }

        trace!("backward through {} at node {}", op.name(), node.id());
        report.visited.push(node.id());
        for (r, c) in node.arg_refs().iter().zip(contributions) {
            if let Some(c) = c {
                report.edges += route(r, c, earlier, i)?;
            }
        }
    }
    Ok(report)
}

/// Deliver one contribution along a structural reference. Returns the number
/// of nodes it reached.
fn route(r: &ArgRef, contribution: Value, earlier: &mut [TapeNode], consumer: usize) -> Result<usize> {
    match r {
        ArgRef::Const => Ok(0),
        ArgRef::Node(id) => {
            let Some(target) = earlier.get_mut(id.index()) else {
                return Err(AutodiffError::InvalidReference {
                    node: consumer,
                    target: id.index(),
                });
            };
            match target.grad.as_mut() {
                Some(g) => g.accumulate(contribution)?,
                None => target.grad = Some(contribution),
            }
            Ok(1)
        }
        ArgRef::Map(refs) => {
            let mut parts = match contribution {
                Value::Map(parts) => parts,
                other => return Err(shape_error("map", &other)),
            };
            let mut reached = 0;
            for (key, sub) in refs {
                if let Some(part) = parts.remove(key) {
                    reached += route(sub, part, earlier, consumer)?;
                }
            }
            Ok(reached)
        }
        ArgRef::Seq(refs) => {
            let parts = match contribution {
                Value::Seq(parts) => parts,
                other => return Err(shape_error("sequence", &other)),
            };
            if parts.len() != refs.len() {
                return Err(TensorError::ShapeMismatch {
                    expected: refs.len(),
                    actual: parts.len(),
                }
                .into());
            }
            let mut reached = 0;
            for (sub, part) in refs.iter().zip(parts) {
                reached += route(sub, part, earlier, consumer)?;
            }
            Ok(reached)
        }
    }
}

fn shape_error(expected: &'static str, got: &Value) -> AutodiffError {
    TensorError::TypeMismatch {
        op: "gradient routing".to_string(),
        expected,
        actual: got.kind(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::primitive::Primitive;

    fn scale(name: &str, k: f64) -> Primitive {
        Primitive::new(
            name,
            move |args| Ok(Value::Scalar(k * args[0].to_f64().unwrap_or_default())),
            move |g, _, _| Ok(vec![Some(Value::Scalar(k * g.to_f64().unwrap_or_default()))]),
        )
    }

    fn s(x: f64) -> Value {
        Value::Scalar(x)
    }

    #[test]
    fn test_chain_rule_through_chain() {
        let (two, three) = (scale("two", 2.0), scale("three", 3.0));
        let mut tape = Tape::new();
        let x = tape.record_root(s(1.0));
        let y = tape.record(&two, vec![s(1.0)], vec![ArgRef::Node(x)], s(2.0)).unwrap();
        let z = tape.record(&three, vec![s(2.0)], vec![ArgRef::Node(y)], s(6.0)).unwrap();

        let report = sweep(&mut tape, z, s(1.0)).unwrap();
        assert_eq!(tape.node(x).unwrap().grad(), Some(&s(6.0)));
        assert_eq!(report.visited, vec![z, y]);
        assert_eq!(report.edges, 2);
    }

    #[test]
    fn test_fan_out_accumulates() {
        let add = Primitive::new(
            "add",
            |args| Ok(args[0].add(&args[1])?),
            |g, _, _| Ok(vec![Some(g.clone()), Some(g.clone())]),
        );
        let mut tape = Tape::new();
        let x = tape.record_root(s(1.0));
        let y = tape
            .record(
                &add,
                vec![s(1.0), s(1.0)],
                vec![ArgRef::Node(x), ArgRef::Node(x)],
                s(2.0),
            )
            .unwrap();
        sweep(&mut tape, y, s(1.0)).unwrap();
        assert_eq!(tape.node(x).unwrap().grad(), Some(&s(2.0)));
    }

    #[test]
    fn test_unreached_nodes_skipped() {
        let two = scale("two", 2.0);
        let mut tape = Tape::new();
        let x = tape.record_root(s(1.0));
        let dead = tape.record(&two, vec![s(1.0)], vec![ArgRef::Node(x)], s(2.0)).unwrap();
        let y = tape.record(&two, vec![s(1.0)], vec![ArgRef::Node(x)], s(2.0)).unwrap();

        let report = sweep(&mut tape, y, s(1.0)).unwrap();
        assert_eq!(report.visited, vec![y]);
        assert!(tape.node(dead).unwrap().grad().is_none());
    }

    #[test]
    fn test_wrong_contribution_count() {
        let bad = Primitive::new("bad", |args| Ok(args[0].clone()), |_, _, _| Ok(vec![]));
        let mut tape = Tape::new();
        let x = tape.record_root(s(1.0));
        let y = tape.record(&bad, vec![s(1.0)], vec![ArgRef::Node(x)], s(1.0)).unwrap();
        assert!(matches!(
            sweep(&mut tape, y, s(1.0)),
            Err(AutodiffError::ArityMismatch { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn test_non_differentiable_blocks_gradient() {
        let stop = Primitive::non_differentiable("stop", |args| Ok(args[0].clone()));
        let mut tape = Tape::new();
        let x = tape.record_root(s(1.0));
        let y = tape.record(&stop, vec![s(1.0)], vec![ArgRef::Node(x)], s(1.0)).unwrap();
        let report = sweep(&mut tape, y, s(1.0)).unwrap();
        assert!(report.visited.is_empty());
        assert!(tape.node(x).unwrap().grad().is_none());
    }

    #[test]
    fn test_output_off_tape() {
        let mut tape = Tape::new();
        tape.record_root(s(1.0));
        assert!(matches!(
            sweep(&mut tape, NodeId::new_for_test(4), s(1.0)),
            Err(AutodiffError::InvalidReference { .. })
        ));
    }
}
