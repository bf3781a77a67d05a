//! Packed-storage index rewriting for sub-byte quantized elements.
//!
//! When q-bit elements ride inside a wider storage type, one storage unit
//! covers `scaling` logical elements and every fragment map has to be
//! corrected: widen the last input coordinate into element space, run the
//! map, then narrow the last output coordinate back to storage space.

use crate::dtype::DType;
use crate::error::{LayoutError, Result};
use crate::layout::CoordinateMap;
use crate::layout::coord::unravel;
use crate::shape::Expression;

/// Packing ratio between a quantized element and its storage unit:
/// `(native_bits / quant_bits) * storage_bits / native_bits`, with every
/// division required to be exact.
pub fn scaling_factor(dtype: DType, quant_bits: usize, storage_dtype: DType) -> Result<usize> {
    let native = dtype.bits();
    if quant_bits == 0 || native % quant_bits != 0 {
        return Err(LayoutError::ScalingMismatch(format!(
            "{quant_bits}-bit elements do not pack evenly into {native}-bit {dtype}"
        )));
    }
    let packed = (native / quant_bits) * storage_dtype.bits();
    if packed % native != 0 {
        return Err(LayoutError::ScalingMismatch(format!(
            "{quant_bits}-bit elements in {storage_dtype} storage do not scale {dtype} exactly"
        )));
    }
    Ok(packed / native)
}

/// Rewrite `map`'s last-dimension arithmetic for packed storage, validating
/// the result over the packed tile `extents`.
///
/// The rewrite composes: rescaling by `s1` then `s2` is the same map as
/// rescaling once by `s1 * s2`, and the rescale of an inverse is the
/// inverse of the rescale, so forward/inverse pairs stay pairs.
pub fn rescale(map: &CoordinateMap, scaling: usize, extents: &[usize]) -> Result<CoordinateMap> {
    assert_eq!(extents.len(), map.arity());
    if scaling == 1 {
        return Ok(map.clone());
    }
    let last = map.arity() - 1;
    let mut indices: Vec<Expression> = map
        .initial_indices
        .iter()
        .map(|&c| Expression::from(c))
        .collect();
    indices[last] = indices[last].clone() * scaling;
    let mut mapped = map.map_indices(&indices);
    mapped[last] = mapped[last].clone() / scaling;
    let scaled = CoordinateMap::new(map.initial_indices.clone(), mapped);

    // The narrowing division has to be exact for every point of the packed
    // tile, and the rewritten map has to still permute it.
    let total: usize = extents.iter().product();
    for flat in 0..total {
        let mut point = unravel(flat, extents);
        point[last] *= scaling;
        let image = map.apply(&point).ok_or_else(|| {
            LayoutError::ScalingMismatch(format!("map is unevaluable at {point:?}"))
        })?;
        if image[last] % scaling != 0 {
            return Err(LayoutError::ScalingMismatch(format!(
                "coordinate {} at {point:?} is not a multiple of {scaling}",
                image[last]
            )));
        }
    }
    if !scaled.is_bijection(extents) {
        return Err(LayoutError::ScalingMismatch(format!(
            "rescaling by {scaling} does not permute the packed tile {extents:?}"
        )));
    }
    Ok(scaled)
}
