//! Fragment index maps for the mma/ldmatrix instruction family.
//!
//! An `ldmatrix` load hands each of the 32 lanes in a warp a run of
//! consecutive elements; which (row, col) of the shared-memory tile a given
//! (lane, slot) pair touches is fixed by the instruction. The maps below
//! express that distribution at tile granularity: 16x16 fragments carry 8
//! elements per lane, the byte-wide 16x32 fragments carry 16.

use crate::layout::CoordinateMap;
use crate::shape::Expression;

type Pair = (Expression, Expression);

fn ldmatrix_32x8_to_shared_16x16(t: Expression, l: Expression) -> Pair {
    (t.clone() % 16, (t / 16) * 8 + l % 8)
}

fn ldmatrix_trans_32x8_to_shared_16x16(t: Expression, l: Expression) -> Pair {
    (
        (t.clone() / 16) * 8 + t.clone() % 8,
        ((t % 16) / 8) * 8 + l % 8,
    )
}

fn ldmatrix_32x16_to_shared_16x32_a(t: Expression, l: Expression) -> Pair {
    (t.clone() % 16, (t / 16) * 16 + l)
}

fn ldmatrix_32x16_to_shared_16x32_b(t: Expression, l: Expression) -> Pair {
    (
        (t.clone() / 16) * 8 + t.clone() % 8,
        ((t % 16) / 8) * 16 + l,
    )
}

/// Lane flattening for a 16x16 tile: 8 elements per lane.
fn warp_lanes_16x16(i: Expression, j: Expression) -> Pair {
    (i * 2 + j.clone() / 8, j % 8)
}

/// Lane flattening for a 16x32 tile: 16 elements per lane.
fn warp_lanes_16x32(i: Expression, j: Expression) -> Pair {
    (i * 2 + j.clone() / 16, j % 16)
}

fn map2(f: impl FnOnce(Expression, Expression) -> Pair) -> CoordinateMap {
    let (r, c) = f('i'.into(), 'j'.into());
    CoordinateMap::new(['i', 'j'], [r, c])
}

/// 16x16 intra-warp fragment layout (half-precision-class tiles).
pub(super) fn shared_16x16(transpose: bool) -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x16(i, j);
        if transpose {
            ldmatrix_trans_32x8_to_shared_16x16(t, l)
        } else {
            ldmatrix_32x8_to_shared_16x16(t, l)
        }
    })
}

pub(super) fn shared_16x16_inverse(transpose: bool) -> CoordinateMap {
    map2(|r, c| {
        if transpose {
            (
                (r.clone() / 8) * 8 + (c.clone() / 8) * 4 + (r.clone() % 8) / 2,
                (r % 2) * 8 + c % 8,
            )
        } else {
            ((c.clone() / 8) * 8 + r.clone() / 2, (r % 2) * 8 + c % 8)
        }
    })
}

/// 16x32 intra-warp fragment layout (byte-class tiles, left operand).
pub(super) fn shared_16x32_a() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x32(i, j);
        ldmatrix_32x16_to_shared_16x32_a(t, l)
    })
}

pub(super) fn shared_16x32_a_inverse() -> CoordinateMap {
    map2(|r, c| ((c.clone() / 16) * 8 + r.clone() / 2, (r % 2) * 16 + c % 16))
}

/// 16x32 intra-warp fragment layout (byte-class tiles, right operand,
/// transposed storage).
pub(super) fn shared_16x32_b() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x32(i, j);
        ldmatrix_32x16_to_shared_16x32_b(t, l)
    })
}

pub(super) fn shared_16x32_b_inverse() -> CoordinateMap {
    map2(|r, c| {
        (
            (r.clone() / 8) * 8 + (c.clone() / 16) * 4 + (r.clone() % 8) / 2,
            (r % 2) * 16 + c % 16,
        )
    })
}

/// Per-lane shuffle compensating the fixed downstream permutation of the
/// third transform stage, 8 elements per lane.
fn mma_32x8_shuffle(t: Expression, l: Expression) -> Pair {
    ((t.clone() % 8) * 4 + l.clone() / 2, (t / 8) * 2 + l % 2)
}

/// Same shuffle for 16-element lanes.
fn mma_32x16_shuffle(t: Expression, l: Expression) -> Pair {
    ((t.clone() % 8) * 4 + l.clone() / 4, (t / 8) * 4 + l % 4)
}

/// Stage-3 swizzle over a 16x16 tile.
pub(super) fn stage3_16x16() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x16(i, j);
        let (t, l) = mma_32x8_shuffle(t, l);
        (t.clone() / 2, (t % 2) * 8 + l)
    })
}

pub(super) fn stage3_16x16_inverse() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x16(i, j);
        // un-shuffle
        let (t, l) = ((l.clone() / 2) * 8 + t.clone() / 4, (t % 4) * 2 + l % 2);
        (t.clone() / 2, (t % 2) * 8 + l)
    })
}

/// Stage-3 swizzle over a 16x32 tile.
pub(super) fn stage3_16x32() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x32(i, j);
        let (t, l) = mma_32x16_shuffle(t, l);
        (t.clone() / 2, (t % 2) * 16 + l)
    })
}

pub(super) fn stage3_16x32_inverse() -> CoordinateMap {
    map2(|i, j| {
        let (t, l) = warp_lanes_16x32(i, j);
        let (t, l) = ((l.clone() / 4) * 8 + t.clone() / 4, (t % 4) * 4 + l % 4);
        (t.clone() / 2, (t % 2) * 16 + l)
    })
}
