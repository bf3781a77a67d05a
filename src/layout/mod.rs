mod coord;
mod mma;
mod scaling;

use std::fmt::Display;

pub use coord::CoordinateMap;
pub use scaling::{rescale, scaling_factor};

use crate::dtype::DType;
use crate::error::{LayoutError, Result};

/// Which matmul operand a fragment layout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B,
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::A => write!(f, "A"),
            Operand::B => write!(f, "B"),
        }
    }
}

/// Hardware fragment shape `(rows, cols)` for one warp-level matrix
/// instruction operand. Half-precision-class types get 16x16, byte-class
/// types (int8 and the float8 formats) get 16x32.
pub fn warp_tile(dtype: DType) -> Result<(usize, usize)> {
    match dtype {
        DType::F16 | DType::Bf16 => Ok((16, 16)),
        d if d.is_byte_class() => Ok((16, 32)),
        other => Err(LayoutError::UnsupportedDatatype(other.to_string())),
    }
}

/// Intra-warp fragment map for propagating an operand's storage layout,
/// returned as a `(forward, inverse)` pair.
///
/// Byte-class tiles only exist in the orientations the hardware loads: the
/// left operand untransposed, the right operand transposed.
pub fn propagate_map(
    transpose: bool,
    dtype: DType,
    operand: Operand,
) -> Result<(CoordinateMap, CoordinateMap)> {
    match dtype {
        DType::F16 | DType::Bf16 => Ok((
            mma::shared_16x16(transpose),
            mma::shared_16x16_inverse(transpose),
        )),
        d if d.is_byte_class() => match (operand, transpose) {
            (Operand::A, false) => Ok((mma::shared_16x32_a(), mma::shared_16x32_a_inverse())),
            (Operand::B, true) => Ok((mma::shared_16x32_b(), mma::shared_16x32_b_inverse())),
            _ => Err(LayoutError::UnsupportedLayout(format!(
                "no byte-class fragment for operand {operand} with transpose={transpose}"
            ))),
        },
        other => Err(LayoutError::UnsupportedLayout(format!(
            "no fragment layout for datatype {other}"
        ))),
    }
}

/// Third-stage swizzle map for a datatype's tile, as a `(forward, inverse)`
/// pair. Keyed by datatype only; it compensates a fixed downstream
/// permutation, not an operand-specific load.
pub fn ladder_stage3_map(dtype: DType) -> Result<(CoordinateMap, CoordinateMap)> {
    match dtype {
        DType::F16 | DType::Bf16 => Ok((mma::stage3_16x16(), mma::stage3_16x16_inverse())),
        d if d.is_byte_class() => Ok((mma::stage3_16x32(), mma::stage3_16x32_inverse())),
        other => Err(LayoutError::UnsupportedLayout(format!(
            "no stage-3 swizzle for datatype {other}"
        ))),
    }
}
