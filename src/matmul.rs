use std::str::FromStr;

use petgraph::stable_graph::NodeIndex;
use tracing::debug;

use crate::dtype::DType;
use crate::error::{LayoutError, Result};
use crate::graph::{AddBias, Cast, Graph, Input, MatMul, Reindex};
use crate::layout::{Operand, propagate_map, warp_tile};
use crate::shape::{Expression, ShapeTracker};

/// Storage orientation of the two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Both row-major: `C[i, j] = sum_k A[i, k] * B[k, j]`.
    RowRow,
    /// Right operand stored transposed: `C[i, j] = sum_k A[i, k] * B[j, k]`.
    RowCol,
}

impl FromStr for Orientation {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "row_row" => Ok(Orientation::RowRow),
            "row_col" => Ok(Orientation::RowCol),
            other => Err(LayoutError::UnsupportedLayout(format!(
                "unknown orientation {other:?}"
            ))),
        }
    }
}

/// Row count of the left operand; a dynamic count stays symbolic (`'m'`)
/// until the caller resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatDim {
    Static(usize),
    Dynamic,
}

impl From<usize> for MatDim {
    fn from(n: usize) -> Self {
        MatDim::Static(n)
    }
}

impl MatDim {
    fn expr(&self) -> Expression {
        match self {
            MatDim::Static(n) => (*n).into(),
            MatDim::Dynamic => 'm'.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatmulConfig {
    pub m: MatDim,
    pub n: usize,
    pub k: usize,
    pub in_dtype: DType,
    pub out_dtype: DType,
    pub accum_dtype: DType,
    pub orientation: Orientation,
    /// Consume the left operand from pre-permuted tile storage.
    pub propagate_a: bool,
    /// Consume the right operand from pre-permuted tile storage.
    pub propagate_b: bool,
    pub with_bias: bool,
}

impl Default for MatmulConfig {
    fn default() -> Self {
        Self {
            m: MatDim::Dynamic,
            n: 16384,
            k: 16384,
            in_dtype: DType::F16,
            out_dtype: DType::F16,
            accum_dtype: DType::F16,
            orientation: Orientation::RowCol,
            propagate_a: false,
            propagate_b: false,
            with_bias: false,
        }
    }
}

/// The selected dataflow graph plus its boundary nodes.
#[derive(Debug)]
pub struct MatmulLayout {
    pub graph: Graph,
    pub a: NodeIndex,
    pub b: NodeIndex,
    pub bias: Option<NodeIndex>,
    pub output: NodeIndex,
}

/// Pick one of the four matmul graph shapes (plain, propagate left,
/// propagate right, propagate both) and wire the reindex layers that undo
/// each propagated operand's tile storage ahead of the reduction.
#[tracing::instrument(skip_all, fields(n = cfg.n, k = cfg.k, dtype = %cfg.in_dtype))]
pub fn select_matmul_layout(cfg: &MatmulConfig) -> Result<MatmulLayout> {
    if cfg.orientation == Orientation::RowRow && (cfg.propagate_a || cfg.propagate_b) {
        return Err(LayoutError::UnsupportedLayout(
            "row-major/row-major orientation cannot consume propagated operands".to_string(),
        ));
    }
    if cfg.m == MatDim::Dynamic && cfg.propagate_a {
        return Err(LayoutError::UnsupportedLayout(
            "a dynamic row count cannot feed a propagated left operand".to_string(),
        ));
    }
    debug!(
        propagate_a = cfg.propagate_a,
        propagate_b = cfg.propagate_b,
        "selected graph shape"
    );

    let mut cx = Graph::new();
    let (a, a2d) = if cfg.propagate_a {
        let MatDim::Static(m) = cfg.m else {
            unreachable!()
        };
        propagated_operand(&mut cx, cfg, "A", m, false, Operand::A)?
    } else {
        let node = cx
            .add_op(Input {
                label: "A".to_string(),
                dtype: cfg.in_dtype,
                shape: ShapeTracker::new(vec![cfg.m.expr(), cfg.k.into()]),
            })
            .finish();
        (node, node)
    };

    let (b, b2d) = if cfg.propagate_b {
        propagated_operand(&mut cx, cfg, "B", cfg.n, true, Operand::B)?
    } else {
        let shape = match cfg.orientation {
            Orientation::RowRow => ShapeTracker::new((cfg.k, cfg.n)),
            Orientation::RowCol => ShapeTracker::new((cfg.n, cfg.k)),
        };
        let node = cx
            .add_op(Input {
                label: "B".to_string(),
                dtype: cfg.in_dtype,
                shape,
            })
            .finish();
        (node, node)
    };

    let mut output = cx
        .add_op(MatMul {
            shape: ShapeTracker::new(vec![cfg.m.expr(), cfg.n.into()]),
            transpose_b: cfg.orientation == Orientation::RowCol,
            accum_dtype: cfg.accum_dtype,
        })
        .input(a2d)
        .input(b2d)
        .finish();
    if cfg.accum_dtype != cfg.out_dtype {
        output = cx
            .add_op(Cast {
                shape: ShapeTracker::new(vec![cfg.m.expr(), cfg.n.into()]),
                dtype: cfg.out_dtype,
            })
            .input(output)
            .finish();
    }
    let mut bias = None;
    if cfg.with_bias {
        let bias_node = cx
            .add_op(Input {
                label: "Bias".to_string(),
                dtype: cfg.in_dtype,
                shape: ShapeTracker::new(cfg.n),
            })
            .finish();
        output = cx
            .add_op(AddBias {
                shape: ShapeTracker::new(vec![cfg.m.expr(), cfg.n.into()]),
                dtype: cfg.out_dtype,
            })
            .input(output)
            .input(bias_node)
            .finish();
        bias = Some(bias_node);
    }
    Ok(MatmulLayout {
        graph: cx,
        a,
        b,
        bias,
        output,
    })
}

/// Declare a propagated operand as its pre-permuted 4D tile placeholder and
/// un-permute it back to `(rows, K)` through the inverse fragment map.
fn propagated_operand(
    cx: &mut Graph,
    cfg: &MatmulConfig,
    label: &str,
    rows: usize,
    transpose: bool,
    operand: Operand,
) -> Result<(NodeIndex, NodeIndex)> {
    let (l, r) = warp_tile(cfg.in_dtype)?;
    if rows % l != 0 || cfg.k % r != 0 {
        return Err(LayoutError::UnsupportedLayout(format!(
            "({rows}, {}) is not tiled evenly by {l}x{r} fragments",
            cfg.k
        )));
    }
    let (_, inverse) = propagate_map(transpose, cfg.in_dtype, operand)?;
    let placeholder = cx
        .add_op(Input {
            label: label.to_string(),
            dtype: cfg.in_dtype,
            shape: ShapeTracker::new((rows / l, cfg.k / r, l, r)),
        })
        .finish();

    // Flat (rows, K) offset z into the tile placeholder: recover the warp
    // coordinates, send them through the inverse map, and re-ravel.
    let i = Expression::from('z') / cfg.k;
    let j = Expression::from('z') % cfg.k;
    let mapped = inverse.map_indices(&[i.clone() % l, j.clone() % r]);
    let index = ((i / l) * (cfg.k / r) + j / r) * (l * r)
        + mapped[0].clone() * r
        + mapped[1].clone();
    let reindex = cx
        .add_op(Reindex {
            shape: ShapeTracker::new((rows, cfg.k)),
            index: index.simplify(),
            dtype: cfg.in_dtype,
        })
        .input(placeholder)
        .finish();
    Ok((placeholder, reindex))
}
