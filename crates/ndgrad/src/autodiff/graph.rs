//! The tape: an append-only arena of recorded operations.
//!
//! Nodes are only ever appended, and every node refers to strictly earlier
//! nodes. A single descending pass over the indices is therefore a valid
//! reverse-topological order, and no graph search is needed at backward time.
//!
//! Between runs the arena keeps its slots. When a new run records at an index
//! that is still occupied, the slot is checked against the incoming node
//! (operation name and arity, or root-ness). A matching slot is reset in
//! place; a mismatching slot is dropped together with every slot after it.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use petgraph::graph::{DiGraph, NodeIndex};

use super::primitive::Primitive;
use crate::error::{AutodiffError, Result};
use crate::value::Value;

static NEXT_TAPE_ID: AtomicU64 = AtomicU64::new(1);

/// Position of a node on its tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one run on one tape, carried by every traced handle.
///
/// The tape part is process-unique; the run part advances on every
/// [`Tape::begin`], so a handle kept from an earlier run no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapeId {
    tape: u64,
    run: u64,
}

impl TapeId {
    fn next() -> Self {
        Self {
            tape: NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed),
            run: 0,
        }
    }

    /// The tape this id belongs to.
    pub fn get(&self) -> u64 {
        self.tape
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: u64) -> Self {
        Self { tape: id, run: 0 }
    }
}

impl fmt::Display for TapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (run {})", self.tape, self.run)
    }
}

/// Which parts of an argument were traced, mirroring the argument's shape.
///
/// A container holding no traced value anywhere collapses to `Const`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgRef {
    Const,
    Node(NodeId),
    Map(BTreeMap<String, ArgRef>),
    Seq(Vec<ArgRef>),
}

impl ArgRef {
    pub fn is_const(&self) -> bool {
        matches!(self, ArgRef::Const)
    }

    /// Every node referenced anywhere inside this argument.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            ArgRef::Const => {}
            ArgRef::Node(id) => out.push(*id),
            ArgRef::Map(m) => m.values().for_each(|r| r.collect_nodes(out)),
            ArgRef::Seq(s) => s.iter().for_each(|r| r.collect_nodes(out)),
        }
    }
}

/// One recorded operation, or a root.
#[derive(Debug)]
pub struct TapeNode {
    id: NodeId,
    op: Option<Primitive>,
    args: Vec<Value>,
    arg_refs: Vec<ArgRef>,
    value: Value,
    pub(crate) grad: Option<Value>,
}

impl TapeNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The recorded primitive; `None` for roots.
    pub fn op(&self) -> Option<&Primitive> {
        self.op.as_ref()
    }

    pub fn op_name(&self) -> Option<&str> {
        self.op.as_ref().map(Primitive::name)
    }

    pub fn is_root(&self) -> bool {
        self.op.is_none()
    }

    pub fn arity(&self) -> usize {
        self.arg_refs.len()
    }

    /// Raw argument values as the primitive saw them.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg_refs(&self) -> &[ArgRef] {
        &self.arg_refs
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Accumulated gradient, present after a backward sweep reached this node.
    pub fn grad(&self) -> Option<&Value> {
        self.grad.as_ref()
    }

    fn matches(&self, op: Option<&Primitive>, arity: usize) -> bool {
        match (&self.op, op) {
            (None, None) => true,
            (Some(mine), Some(theirs)) => mine.same_op(theirs) && self.arity() == arity,
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self.op_name() {
            Some(name) => format!("{}/{}", name, self.arity()),
            None => "root".to_string(),
        }
    }
}

/// What happens to occupied slots when a new run starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecyclePolicy {
    /// Verify and reset slots in place (default).
    #[default]
    Reuse,
    /// Drop every slot at the start of a run.
    Reallocate,
}

/// Slot bookkeeping for the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecycleStats {
    /// Nodes appended past the end of the arena.
    pub fresh: usize,
    /// Nodes written into a verified slot.
    pub recycled: usize,
    /// Slots that failed verification; each one also truncated the arena.
    pub mismatched: usize,
}

/// Structural summary of a recording: node count plus a digest of the
/// `(operation, arity)` sequence. Values do not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub node_count: usize,
    pub digest: u64,
}

/// Append-only node arena owned by one differentiation driver.
#[derive(Debug)]
pub struct Tape {
    id: TapeId,
    nodes: Vec<TapeNode>,
    len: usize,
    policy: RecyclePolicy,
    stats: RecycleStats,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    pub fn new() -> Self {
        Self::with_policy(RecyclePolicy::default())
    }

    pub fn with_policy(policy: RecyclePolicy) -> Self {
        Self {
            id: TapeId::next(),
            nodes: Vec::new(),
            len: 0,
            policy,
            stats: RecycleStats::default(),
        }
    }

    pub fn id(&self) -> TapeId {
        self.id
    }

    pub fn policy(&self) -> RecyclePolicy {
        self.policy
    }

    /// Nodes recorded in the current run.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots held by the arena, live or left over from an earlier run.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[TapeNode] {
        &self.nodes[..self.len]
    }

    pub fn node(&self, id: NodeId) -> Option<&TapeNode> {
        self.nodes().get(id.index())
    }

    pub fn stats(&self) -> RecycleStats {
        self.stats
    }

    /// Start a new run. Existing slots stay allocated for recycling unless
    /// the policy says otherwise.
    pub fn begin(&mut self) {
        self.id.run += 1;
        self.len = 0;
        self.stats = RecycleStats::default();
        if self.policy == RecyclePolicy::Reallocate {
            self.nodes.clear();
        }
    }

    /// End a run, dropping slots the run did not reach.
    pub fn finish(&mut self) {
        if self.nodes.len() > self.len {
            debug!(
                "tape {}: releasing {} stale slot(s)",
                self.id.tape,
                self.nodes.len() - self.len
            );
        }
        self.nodes.truncate(self.len);
    }

    /// Forget everything. Used after a failed run so nothing from it is
    /// ever recycled.
    pub fn invalidate(&mut self) {
        self.nodes.clear();
        self.len = 0;
    }

    /// Record a root holding an input leaf.
    pub fn record_root(&mut self, value: Value) -> NodeId {
        self.place(None, Vec::new(), Vec::new(), value)
    }

    /// Record a primitive application.
    ///
    /// # Errors
    ///
    /// `InvalidReference` if an argument refers to a node that is not
    /// strictly earlier than the one being recorded.
    pub fn record(
        &mut self,
        op: &Primitive,
        args: Vec<Value>,
        arg_refs: Vec<ArgRef>,
        value: Value,
    ) -> Result<NodeId> {
        let index = self.len;
        if let Some(bad) = arg_refs
            .iter()
            .flat_map(ArgRef::nodes)
            .find(|id| id.index() >= index)
        {
            return Err(AutodiffError::InvalidReference {
                node: index,
                target: bad.index(),
            });
        }
        Ok(self.place(Some(op), args, arg_refs, value))
    }

    fn place(
        &mut self,
        op: Option<&Primitive>,
        args: Vec<Value>,
        arg_refs: Vec<ArgRef>,
        value: Value,
    ) -> NodeId {
        let id = NodeId(self.len);
        self.len += 1;

        if let Some(slot) = self.nodes.get_mut(id.0) {
            if slot.matches(op, arg_refs.len()) {
                // same name, but possibly different captured state
                slot.op = op.cloned();
                slot.args.clear();
                slot.args.extend(args);
                slot.arg_refs.clear();
                slot.arg_refs.extend(arg_refs);
                slot.value = value;
                slot.grad = None;
                self.stats.recycled += 1;
                trace!("tape {}: recycled slot {}", self.id.tape, id);
                return id;
            }
            debug!(
                "tape {}: slot {} held {} but run recorded {}; dropping {} slot(s)",
                self.id.tape,
                id,
                slot.describe(),
                op.map_or_else(|| "root".to_string(), |p| format!("{}/{}", p.name(), arg_refs.len())),
                self.nodes.len() - id.0
            );
            self.nodes.truncate(id.0);
            self.stats.mismatched += 1;
        } else {
            self.stats.fresh += 1;
        }

        self.nodes.push(TapeNode {
            id,
            op: op.cloned(),
            args,
            arg_refs,
            value,
            grad: None,
        });
        id
    }

    /// Fingerprint of the current run.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = DefaultHasher::new();
        for node in self.nodes() {
            node.op_name().hash(&mut hasher);
            node.arity().hash(&mut hasher);
        }
        Fingerprint {
            node_count: self.len,
            digest: hasher.finish(),
        }
    }

    /// Dependency graph of the current run; edges point from operand to
    /// consumer, and graph indices coincide with tape indices.
    pub fn to_digraph(&self) -> DiGraph<NodeId, ()> {
        let mut graph = DiGraph::with_capacity(self.len, self.len);
        for node in self.nodes() {
            graph.add_node(node.id);
        }
        for node in self.nodes() {
            for r in &node.arg_refs {
                for src in r.nodes() {
                    graph.add_edge(NodeIndex::new(src.0), NodeIndex::new(node.id.0), ());
                }
            }
        }
        graph
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [TapeNode] {
        &mut self.nodes[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    fn unary(name: &str) -> Primitive {
        Primitive::new(name, |args| Ok(args[0].clone()), |g, _, _| Ok(vec![Some(g.clone())]))
    }

    fn scalar(x: f64) -> Value {
        Value::Scalar(x)
    }

    fn record_chain(tape: &mut Tape, ops: &[&Primitive]) -> NodeId {
        let mut last = tape.record_root(scalar(1.0));
        for op in ops {
            last = tape
                .record(op, vec![scalar(1.0)], vec![ArgRef::Node(last)], scalar(1.0))
                .unwrap();
        }
        last
    }

    #[test]
    fn test_indices_increase() {
        let mut tape = Tape::new();
        let a = tape.record_root(scalar(1.0));
        let b = tape.record_root(scalar(2.0));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(tape.len(), 2);
        assert!(tape.node(a).unwrap().is_root());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut tape = Tape::new();
        let neg = unary("neg");
        tape.record_root(scalar(1.0));
        let err = tape
            .record(
                &neg,
                vec![scalar(1.0)],
                vec![ArgRef::Node(NodeId::new_for_test(1))],
                scalar(1.0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AutodiffError::InvalidReference { node: 1, target: 1 }
        ));
    }

    #[test]
    fn test_identical_runs_recycle_every_slot() {
        let (neg, exp) = (unary("neg"), unary("exp"));
        let mut tape = Tape::new();

        tape.begin();
        record_chain(&mut tape, &[&neg, &exp]);
        tape.finish();
        let first = tape.fingerprint();
        assert_eq!(tape.stats().fresh, 3);

        tape.begin();
        record_chain(&mut tape, &[&neg, &exp]);
        tape.finish();
        assert_eq!(tape.fingerprint(), first);
        assert_eq!(
            tape.stats(),
            RecycleStats {
                fresh: 0,
                recycled: 3,
                mismatched: 0
            }
        );
    }

    #[test]
    fn test_mismatch_truncates_from_first_difference() {
        let (neg, exp, log) = (unary("neg"), unary("exp"), unary("log"));
        let mut tape = Tape::new();

        tape.begin();
        record_chain(&mut tape, &[&neg, &exp, &neg]);
        tape.finish();
        let before = tape.fingerprint();

        tape.begin();
        record_chain(&mut tape, &[&neg, &log, &neg]);
        tape.finish();

        // root and neg recycled, slot 2 mismatched, slot 3 appended fresh
        assert_eq!(
            tape.stats(),
            RecycleStats {
                fresh: 1,
                recycled: 2,
                mismatched: 1
            }
        );
        assert_ne!(tape.fingerprint(), before);
        assert_eq!(tape.nodes()[2].op_name(), Some("log"));
    }

    #[test]
    fn test_root_versus_op_is_a_mismatch() {
        let neg = unary("neg");
        let mut tape = Tape::new();
        tape.begin();
        record_chain(&mut tape, &[&neg]);
        tape.finish();

        tape.begin();
        tape.record_root(scalar(0.0));
        tape.record_root(scalar(0.0));
        tape.finish();
        assert_eq!(tape.stats().mismatched, 1);
        assert!(tape.nodes().iter().all(TapeNode::is_root));
    }

    #[test]
    fn test_recycled_slot_takes_the_new_primitive() {
        let scale_by = |k: f64| {
            Primitive::new(
                "scale_by",
                move |args| Ok(Value::Scalar(k * args[0].to_f64().unwrap_or_default())),
                move |g, _, _| Ok(vec![Some(Value::Scalar(k * g.to_f64().unwrap_or_default()))]),
            )
        };
        let mut tape = Tape::new();

        tape.begin();
        record_chain(&mut tape, &[&scale_by(2.0)]);
        tape.finish();

        tape.begin();
        record_chain(&mut tape, &[&scale_by(3.0)]);
        tape.finish();
        assert_eq!(tape.stats().recycled, 2);

        let op = tape.nodes()[1].op().unwrap();
        let grads = op.backward(&scalar(1.0), &[scalar(1.0)], &scalar(3.0)).unwrap().unwrap();
        assert_eq!(grads, vec![Some(scalar(3.0))]);
    }

    #[test]
    fn test_begin_starts_a_new_run_id() {
        let mut tape = Tape::new();
        tape.begin();
        let first = tape.id();
        tape.begin();
        let second = tape.id();
        assert_eq!(first.get(), second.get());
        assert_eq!(second.run(), first.run() + 1);
        assert_ne!(first, second);
        assert_ne!(Tape::new().id().get(), first.get());
    }

    #[test]
    fn test_shorter_run_releases_tail() {
        let neg = unary("neg");
        let mut tape = Tape::new();
        tape.begin();
        record_chain(&mut tape, &[&neg, &neg, &neg]);
        tape.finish();
        assert_eq!(tape.capacity(), 4);

        tape.begin();
        record_chain(&mut tape, &[&neg]);
        tape.finish();
        assert_eq!(tape.capacity(), 2);
        assert_eq!(tape.fingerprint().node_count, 2);
    }

    #[test]
    fn test_reallocate_policy_never_recycles() {
        let neg = unary("neg");
        let mut tape = Tape::with_policy(RecyclePolicy::Reallocate);
        for _ in 0..2 {
            tape.begin();
            record_chain(&mut tape, &[&neg]);
            tape.finish();
        }
        assert_eq!(tape.stats().recycled, 0);
        assert_eq!(tape.stats().fresh, 2);
    }

    #[test]
    fn test_recycled_slot_takes_new_values() {
        let neg = unary("neg");
        let mut tape = Tape::new();
        tape.begin();
        let root = tape.record_root(Value::Tensor(Tensor::ones(&[2])));
        tape.nodes_mut()[root.index()].grad = Some(scalar(5.0));
        tape.finish();

        tape.begin();
        let root = tape.record_root(Value::Tensor(Tensor::zeros(&[3])));
        tape.record(&neg, vec![scalar(0.0)], vec![ArgRef::Node(root)], scalar(0.0))
            .unwrap();
        tape.finish();

        let node = tape.node(root).unwrap();
        assert_eq!(node.value().shape(), Some(&[3usize][..]));
        assert!(node.grad().is_none());
    }

    #[test]
    fn test_invalidate_clears_slots() {
        let neg = unary("neg");
        let mut tape = Tape::new();
        tape.begin();
        record_chain(&mut tape, &[&neg]);
        tape.invalidate();
        assert!(tape.is_empty());
        assert_eq!(tape.capacity(), 0);

        tape.begin();
        record_chain(&mut tape, &[&neg]);
        assert_eq!(tape.stats().fresh, 2);
    }

    #[test]
    fn test_distinct_tape_ids() {
        assert_ne!(Tape::new().id(), Tape::new().id());
    }

    #[test]
    fn test_digraph_edges_point_forward() {
        let add = Primitive::new(
            "add",
            |args| Ok(args[0].clone()),
            |g, _, _| Ok(vec![Some(g.clone()), Some(g.clone())]),
        );
        let mut tape = Tape::new();
        let a = tape.record_root(scalar(1.0));
        let b = tape.record_root(scalar(2.0));
        let c = tape
            .record(
                &add,
                vec![scalar(1.0), scalar(2.0)],
                vec![ArgRef::Node(a), ArgRef::Node(b)],
                scalar(3.0),
            )
            .unwrap();
        let graph = tape.to_digraph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        for edge in graph.raw_edges() {
            assert!(edge.source().index() < edge.target().index());
            assert_eq!(edge.target().index(), c.index());
        }
    }

    #[test]
    fn test_arg_ref_nodes_recurse() {
        let r = ArgRef::Map(BTreeMap::from([
            ("a".to_string(), ArgRef::Node(NodeId::new_for_test(0))),
            (
                "b".to_string(),
                ArgRef::Seq(vec![ArgRef::Const, ArgRef::Node(NodeId::new_for_test(2))]),
            ),
        ]));
        assert_eq!(
            r.nodes(),
            vec![NodeId::new_for_test(0), NodeId::new_for_test(2)]
        );
        assert!(!r.is_const());
    }
}
