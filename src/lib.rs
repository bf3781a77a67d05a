//! Builds the coordinate-permutation programs that rearrange matrix tiles
//! from row/column storage into the fragment layout tensor-core matrix
//! instructions consume, including the index corrections needed when
//! sub-byte quantized elements are packed into wider storage.
//!
//! The crate only constructs descriptions: symbolic index maps composed
//! into small dataflow graphs for a downstream compiler backend. Nothing
//! here executes, mutates shared state, or performs I/O, so every output is
//! a pure function of its configuration.

pub mod dtype;
pub mod error;
pub mod graph;
pub mod layout;
pub mod matmul;
pub mod permutate;
pub mod shape;

pub mod prelude {
    pub use crate::dtype::DType;
    pub use crate::error::{LayoutError, Result};
    pub use crate::graph::{AddBias, Cast, Graph, Input, MatMul, Op, Reindex};
    pub use crate::layout::{
        CoordinateMap, Operand, ladder_stage3_map, propagate_map, rescale, scaling_factor,
        warp_tile,
    };
    pub use crate::matmul::{
        MatDim, MatmulConfig, MatmulLayout, Orientation, select_matmul_layout,
    };
    pub use crate::permutate::{PermutateConfig, PermuteProgram, build_permutation};
    pub use crate::shape::{Expression, ShapeTracker, Term, ToShape};
    pub use petgraph;
    pub use petgraph::stable_graph::NodeIndex;
    pub use rustc_hash::{FxHashMap, FxHashSet};
}
