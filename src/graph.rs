use std::fmt::Debug;

use as_any::AsAny;
use itertools::Itertools;
use petgraph::{Direction, algo::toposort, prelude::StableGraph, stable_graph::NodeIndex, visit::EdgeRef};

use crate::dtype::DType;
use crate::shape::{Expression, ShapeTracker};

/// One node of a layout dataflow program.
///
/// These are descriptions for a downstream compiler backend, not executable
/// kernels; an op carries its output shape and dtype and whatever per-element
/// index math it needs.
pub trait Op: Debug + AsAny {
    fn name(&self) -> &'static str;
    fn shape(&self) -> &ShapeTracker;
    fn dtype(&self) -> DType;
}

/// A graph boundary tensor supplied by the caller.
#[derive(Debug, Clone)]
pub struct Input {
    pub label: String,
    pub dtype: DType,
    pub shape: ShapeTracker,
}

impl Op for Input {
    fn name(&self) -> &'static str {
        "Input"
    }
    fn shape(&self) -> &ShapeTracker {
        &self.shape
    }
    fn dtype(&self) -> DType {
        self.dtype
    }
}

/// Pure data movement: output element `z` is input element `index(z)`.
///
/// The index expression is closed-form over the flat output offset, so a
/// chain of rearrangements collapses into a single node.
#[derive(Debug, Clone)]
pub struct Reindex {
    pub shape: ShapeTracker,
    pub index: Expression,
    pub dtype: DType,
}

impl Op for Reindex {
    fn name(&self) -> &'static str {
        "Reindex"
    }
    fn shape(&self) -> &ShapeTracker {
        &self.shape
    }
    fn dtype(&self) -> DType {
        self.dtype
    }
}

/// Inner-product reduction over the two operands' shared axis.
#[derive(Debug, Clone)]
pub struct MatMul {
    pub shape: ShapeTracker,
    /// Right operand stored row-major (K, N) when false, (N, K) when true.
    pub transpose_b: bool,
    pub accum_dtype: DType,
}

impl Op for MatMul {
    fn name(&self) -> &'static str {
        "MatMul"
    }
    fn shape(&self) -> &ShapeTracker {
        &self.shape
    }
    fn dtype(&self) -> DType {
        self.accum_dtype
    }
}

/// Adds a per-column bias vector to its first input.
#[derive(Debug, Clone)]
pub struct AddBias {
    pub shape: ShapeTracker,
    pub dtype: DType,
}

impl Op for AddBias {
    fn name(&self) -> &'static str {
        "AddBias"
    }
    fn shape(&self) -> &ShapeTracker {
        &self.shape
    }
    fn dtype(&self) -> DType {
        self.dtype
    }
}

/// Element type conversion.
#[derive(Debug, Clone)]
pub struct Cast {
    pub shape: ShapeTracker,
    pub dtype: DType,
}

impl Op for Cast {
    fn name(&self) -> &'static str {
        "Cast"
    }
    fn shape(&self) -> &ShapeTracker {
        &self.shape
    }
    fn dtype(&self) -> DType {
        self.dtype
    }
}

/// The opaque compute-graph handle handed to the backend.
///
/// Edge weights are input slot numbers, so multi-input ops keep their
/// operand order under petgraph's arbitrary edge iteration.
#[derive(Default)]
pub struct Graph {
    pub graph: StableGraph<Box<dyn Op>, u8>,
}

impl Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, op: impl Op + 'static) -> NewOp<'_> {
        let id = self.graph.add_node(Box::new(op));
        NewOp {
            id,
            graph: self,
            num_srcs: 0,
        }
    }

    pub fn op(&self, id: NodeIndex) -> &dyn Op {
        self.graph[id].as_ref()
    }

    /// Inputs of a node in slot order.
    pub fn srcs(&self, id: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .sorted_by_key(|e| *e.weight())
            .map(|e| e.source())
            .collect()
    }

    /// Nodes in dependency order.
    pub fn topo(&self) -> Vec<NodeIndex> {
        toposort(&self.graph, None).expect("layout graphs are acyclic")
    }

    /// Nodes with no consumers, i.e. the externally visible results.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|n| {
                self.graph
                    .edges_directed(*n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Builder handle returned by [`Graph::add_op`]; wire inputs then `finish`.
pub struct NewOp<'a> {
    id: NodeIndex,
    graph: &'a mut Graph,
    num_srcs: u8,
}

impl NewOp<'_> {
    pub fn input(mut self, src: NodeIndex) -> Self {
        self.graph.graph.add_edge(src, self.id, self.num_srcs);
        self.num_srcs += 1;
        self
    }

    pub fn finish(self) -> NodeIndex {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use as_any::Downcast;

    #[test]
    fn test_builder_wires_slots() {
        let mut cx = Graph::new();
        let a = cx
            .add_op(Input {
                label: "A".to_string(),
                dtype: DType::F16,
                shape: ShapeTracker::new((4, 8)),
            })
            .finish();
        let b = cx
            .add_op(Input {
                label: "B".to_string(),
                dtype: DType::F16,
                shape: ShapeTracker::new((6, 8)),
            })
            .finish();
        let c = cx
            .add_op(MatMul {
                shape: ShapeTracker::new((4, 6)),
                transpose_b: true,
                accum_dtype: DType::F32,
            })
            .input(a)
            .input(b)
            .finish();
        assert_eq!(cx.srcs(c), vec![a, b]);
        assert_eq!(cx.sinks(), vec![c]);
        assert_eq!(cx.topo().last(), Some(&c));
        assert!(cx.op(c).downcast_ref::<MatMul>().is_some());
        assert_eq!(cx.op(a).dtype(), DType::F16);
    }
}
