use petgraph::stable_graph::NodeIndex;
use tracing::debug;

use crate::dtype::DType;
use crate::error::{LayoutError, Result};
use crate::graph::{Graph, Input, Reindex};
use crate::layout::{
    CoordinateMap, Operand, ladder_stage3_map, propagate_map, rescale, scaling_factor, warp_tile,
};
use crate::shape::{Expression, ShapeTracker};

/// Configuration for one permutation program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutateConfig {
    pub m: usize,
    pub n: usize,
    /// Logical element type the fragments are defined over.
    pub dtype: DType,
    /// Quantized element width; only widths strictly below the logical
    /// element width trigger packed-storage scaling.
    pub quant_bits: Option<usize>,
    /// Container type the (possibly packed) elements are stored in.
    pub storage_dtype: DType,
    pub operand: Operand,
    pub transpose: bool,
    /// Number of transform stages to apply, 1..=3.
    pub stages: usize,
}

impl Default for PermutateConfig {
    fn default() -> Self {
        Self {
            m: 16,
            n: 16,
            dtype: DType::F16,
            quant_bits: None,
            storage_dtype: DType::F16,
            operand: Operand::B,
            transpose: false,
            stages: 1,
        }
    }
}

/// A finished two-tensor transformation program.
///
/// Only the root input and the last stage survive; the index math of every
/// intermediate stage is composed into `index_map` / `index_expression`.
#[derive(Debug, Clone)]
pub struct PermuteProgram {
    /// `(M, N / scaling)` storage-space input.
    pub input_shape: ShapeTracker,
    pub input_dtype: DType,
    /// `(M/l, (N/scaling)/r, l, r)` tiled output.
    pub output_shape: ShapeTracker,
    /// Name of the last stage left in the program.
    pub stage: &'static str,
    /// Output coordinates `(a, b, i, j)` to input coordinates `(row, col)`.
    pub index_map: [Expression; 2],
    /// Flat output offset `z` to flat input offset.
    pub index_expression: Expression,
    pub scaling: usize,
    /// `(l, r)` after any scaling adjustment.
    pub tile: (usize, usize),
}

impl PermuteProgram {
    /// Emit the externally visible two-node graph.
    pub fn lower(&self, cx: &mut Graph) -> (NodeIndex, NodeIndex) {
        let inp = cx
            .add_op(Input {
                label: "inp".to_string(),
                dtype: self.input_dtype,
                shape: self.input_shape.clone(),
            })
            .finish();
        let out = cx
            .add_op(Reindex {
                shape: self.output_shape.clone(),
                index: self.index_expression.clone(),
                dtype: self.input_dtype,
            })
            .input(inp)
            .finish();
        (inp, out)
    }
}

/// Build the layout permutation program for one operand.
///
/// Stage 1 reshapes the matrix into warp tiles, stage 2 applies the
/// intra-warp fragment layout within each tile, and stage 3 applies the
/// inverse of the stage-3 swizzle — inverse because that stage undoes a
/// fixed downstream permutation rather than introducing a new one.
#[tracing::instrument(skip_all, fields(m = cfg.m, n = cfg.n, dtype = %cfg.dtype, stages = cfg.stages))]
pub fn build_permutation(cfg: &PermutateConfig) -> Result<PermuteProgram> {
    if !(1..=3).contains(&cfg.stages) {
        return Err(LayoutError::InvalidTransformKind(cfg.stages));
    }
    let (l, mut r) = warp_tile(cfg.dtype)?;
    let (mut intra, _) = propagate_map(cfg.transpose, cfg.dtype, cfg.operand)?;
    let (_, mut stage3_inv) = ladder_stage3_map(cfg.dtype)?;

    let mut scaling = 1;
    if let Some(quant_bits) = cfg.quant_bits
        && quant_bits < cfg.dtype.bits()
    {
        scaling = scaling_factor(cfg.dtype, quant_bits, cfg.storage_dtype)?;
    }
    if scaling > 1 {
        if r % scaling != 0 || cfg.n % scaling != 0 {
            return Err(LayoutError::ScalingMismatch(format!(
                "packing factor {scaling} does not divide the {r}-wide tile of ({}, {})",
                cfg.m, cfg.n
            )));
        }
        r /= scaling;
        intra = rescale(&intra, scaling, &[l, r])?;
        stage3_inv = rescale(&stage3_inv, scaling, &[l, r])?;
    }
    let n_storage = cfg.n / scaling;
    if cfg.m % l != 0 || n_storage % r != 0 {
        return Err(LayoutError::UnsupportedLayout(format!(
            "({}, {n_storage}) is not tiled evenly by {l}x{r} fragments",
            cfg.m
        )));
    }
    let (tiles_m, tiles_n) = (cfg.m / l, n_storage / r);
    debug!(scaling, l, r, tiles_m, tiles_n, "resolved tile geometry");

    // Stage 1 is the tiling reshape itself, identity on indices.
    let input_shape = ShapeTracker::new((cfg.m, n_storage));
    let mut tiled = input_shape.clone();
    tiled.split_dims(1, r);
    tiled.split_dims(0, l);
    tiled.permute(&[0, 2, 1, 3]);
    let output_shape = ShapeTracker::new(tiled.dims.to_vec());

    let mut row = Expression::from('a') * l + 'i';
    let mut col = Expression::from('b') * r + 'j';
    let mut stage = "inter_warp_permutate";
    // Later stages rebind the within-tile coordinates; the tile indices
    // (a, b) pass through untouched.
    if cfg.stages >= 2 {
        (row, col) = rebind_tile_coords(row, col, &intra);
        stage = "intra_warp_permutate";
    }
    if cfg.stages >= 3 {
        (row, col) = rebind_tile_coords(row, col, &stage3_inv);
        stage = "permutate";
    }

    let flat_coords = [
        ('a', Expression::from('z') / (tiles_n * l * r)),
        ('b', (Expression::from('z') / (l * r)) % tiles_n),
        ('i', (Expression::from('z') / r) % l),
        ('j', Expression::from('z') % r),
    ];
    let index_expression = (row.clone() * n_storage + col.clone())
        .substitute_all(&flat_coords)
        .simplify();

    Ok(PermuteProgram {
        input_shape,
        input_dtype: cfg.storage_dtype,
        output_shape,
        stage,
        index_map: [row, col],
        index_expression,
        scaling,
        tile: (l, r),
    })
}

fn rebind_tile_coords(
    row: Expression,
    col: Expression,
    map: &CoordinateMap,
) -> (Expression, Expression) {
    let mapped = map.map_indices(&[Expression::from('i'), Expression::from('j')]);
    let subs = [('i', mapped[0].clone()), ('j', mapped[1].clone())];
    (
        row.substitute_all(&subs).simplify(),
        col.substitute_all(&subs).simplify(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use as_any::Downcast;
    use rustc_hash::FxHashMap;

    fn eval_flat(program: &PermuteProgram, z: usize) -> usize {
        let vars: FxHashMap<char, usize> = [('z', z)].into_iter().collect();
        program.index_expression.exec(&vars).unwrap()
    }

    fn assert_permutes_input(program: &PermuteProgram) {
        let total: usize = program.input_shape.shape_usize().iter().product();
        let out_total: usize = program.output_shape.shape_usize().iter().product();
        assert_eq!(total, out_total);
        let mut seen = vec![false; total];
        for z in 0..total {
            let src = eval_flat(program, z);
            assert!(src < total);
            assert!(!std::mem::replace(&mut seen[src], true), "offset {src} read twice");
        }
    }

    #[test]
    fn test_rejects_zero_and_excess_stages() {
        for stages in [0, 4] {
            let result = build_permutation(&PermutateConfig {
                m: 256,
                n: 256,
                stages,
                ..Default::default()
            });
            assert_eq!(result.unwrap_err(), LayoutError::InvalidTransformKind(stages));
        }
    }

    #[test]
    fn test_stage1_is_pure_reshape() {
        let program = build_permutation(&PermutateConfig {
            m: 32,
            n: 32,
            stages: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(program.output_shape.shape_usize(), vec![2, 2, 16, 16]);
        assert_eq!(program.stage, "inter_warp_permutate");
        // identity on indices: flat offset (a*16 + i)*32 + b*16 + j
        for z in 0..(32 * 32) {
            let (a, b, i, j) = (z / 512, (z / 256) % 2, (z / 16) % 16, z % 16);
            assert_eq!(eval_flat(&program, z), (a * 16 + i) * 32 + b * 16 + j);
            let coords: FxHashMap<char, usize> =
                [('a', a), ('b', b), ('i', i), ('j', j)].into_iter().collect();
            assert_eq!(program.index_map[0].exec(&coords), Some(a * 16 + i));
            assert_eq!(program.index_map[1].exec(&coords), Some(b * 16 + j));
        }
    }

    #[test]
    fn test_stage2_applies_fragment_layout() {
        let cfg = PermutateConfig {
            m: 32,
            n: 32,
            stages: 2,
            ..Default::default()
        };
        let program = build_permutation(&cfg).unwrap();
        assert_eq!(program.output_shape.shape_usize(), vec![2, 2, 16, 16]);
        assert_eq!(program.stage, "intra_warp_permutate");
        assert_permutes_input(&program);
        let (intra, _) = propagate_map(false, DType::F16, Operand::B).unwrap();
        for z in 0..(32 * 32) {
            let (a, b, i, j) = (z / 512, (z / 256) % 2, (z / 16) % 16, z % 16);
            let mapped = intra.apply(&[i, j]).unwrap();
            let expected = (a * 16 + mapped[0]) * 32 + b * 16 + mapped[1];
            assert_eq!(eval_flat(&program, z), expected);
        }
        // and it is not the stage-1 identity
        let identity = build_permutation(&PermutateConfig { stages: 1, ..cfg }).unwrap();
        assert!((0..1024).any(|z| eval_flat(&program, z) != eval_flat(&identity, z)));
    }

    #[test]
    fn test_stage3_composes_inverse_swizzle() {
        let cfg = PermutateConfig {
            m: 32,
            n: 32,
            stages: 3,
            ..Default::default()
        };
        let program = build_permutation(&cfg).unwrap();
        assert_eq!(program.output_shape.shape_usize(), vec![2, 2, 16, 16]);
        assert_eq!(program.stage, "permutate");
        assert_permutes_input(&program);
        // stage 3 reads stage 2 through the inverse swizzle
        let (intra, _) = propagate_map(false, DType::F16, Operand::B).unwrap();
        let (_, stage3_inv) = ladder_stage3_map(DType::F16).unwrap();
        for z in 0..(32 * 32) {
            let (a, b, i, j) = (z / 512, (z / 256) % 2, (z / 16) % 16, z % 16);
            let swizzled = stage3_inv.apply(&[i, j]).unwrap();
            let mapped = intra.apply(&swizzled).unwrap();
            let expected = (a * 16 + mapped[0]) * 32 + b * 16 + mapped[1];
            assert_eq!(eval_flat(&program, z), expected);
        }
    }

    #[test]
    fn test_quantized_end_to_end() {
        let program = build_permutation(&PermutateConfig {
            m: 256,
            n: 256,
            dtype: DType::I8,
            quant_bits: Some(4),
            storage_dtype: DType::I8,
            operand: Operand::B,
            transpose: true,
            stages: 3,
        })
        .unwrap();
        assert_eq!(program.scaling, 2);
        assert_eq!(program.tile, (16, 16));
        assert_eq!(program.input_shape.shape_usize(), vec![256, 128]);
        assert_eq!(program.output_shape.shape_usize(), vec![16, 8, 16, 16]);
        assert_permutes_input(&program);
    }

    #[test]
    fn test_quant_width_at_native_width_is_inert() {
        let program = build_permutation(&PermutateConfig {
            m: 32,
            n: 64,
            dtype: DType::I8,
            quant_bits: Some(8),
            storage_dtype: DType::I8,
            transpose: true,
            stages: 2,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(program.scaling, 1);
        assert_eq!(program.tile, (16, 32));
        assert_eq!(program.output_shape.shape_usize(), vec![2, 2, 16, 32]);
    }

    #[test]
    fn test_errors_propagate() {
        assert!(matches!(
            build_permutation(&PermutateConfig {
                m: 32,
                n: 32,
                dtype: DType::F32,
                ..Default::default()
            }),
            Err(LayoutError::UnsupportedDatatype(_))
        ));
        // byte-class right operand only exists transposed
        assert!(matches!(
            build_permutation(&PermutateConfig {
                m: 32,
                n: 64,
                dtype: DType::I8,
                storage_dtype: DType::I8,
                transpose: false,
                ..Default::default()
            }),
            Err(LayoutError::UnsupportedLayout(_))
        ));
        // tile must divide the matrix
        assert!(matches!(
            build_permutation(&PermutateConfig {
                m: 24,
                n: 32,
                ..Default::default()
            }),
            Err(LayoutError::UnsupportedLayout(_))
        ));
        assert!(matches!(
            build_permutation(&PermutateConfig {
                m: 32,
                n: 32,
                quant_bits: Some(3),
                storage_dtype: DType::I8,
                ..Default::default()
            }),
            Err(LayoutError::ScalingMismatch(_))
        ));
    }

    #[test]
    fn test_lower_emits_two_node_graph() {
        let program = build_permutation(&PermutateConfig {
            m: 32,
            n: 32,
            stages: 3,
            ..Default::default()
        })
        .unwrap();
        let mut cx = Graph::new();
        let (inp, out) = program.lower(&mut cx);
        assert_eq!(cx.node_count(), 2);
        assert_eq!(cx.srcs(out), vec![inp]);
        assert_eq!(cx.sinks(), vec![out]);
        let reindex = cx.op(out).downcast_ref::<Reindex>().unwrap();
        assert_eq!(reindex.shape.shape_usize(), vec![2, 2, 16, 16]);
        assert_eq!(cx.op(inp).shape().shape_usize(), vec![32, 32]);
    }
}
