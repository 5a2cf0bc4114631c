//! Gaussian spatial weights used to score patch similarity.

use ndarray::{Array2, ArrayView1};

use crate::accumulator::{try_zeroed, window_side};
use crate::error::{AllocationTarget, NlMeansError, Result};

/// Table of `exp(-(m² + n²) / (2a²))` over patch offsets `(dy, dx)` in
/// `[-sy, sy] × [-sx, sx]`.
///
/// `m` and `n` are the offsets pulled toward zero by the block radius, so
/// everything inside the block footprint weighs 1 and block mode can share
/// the table with pixel mode.
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    table: Array2<f64>,
    sx: usize,
    sy: usize,
}

/// Offset clamped toward zero by `block` on the side facing outward.
#[inline]
fn clamp_to_block(offset: isize, block: isize) -> isize {
    if offset < 0 {
        (offset + block).min(0)
    } else {
        (offset - block).max(0)
    }
}

impl GaussianKernel {
    pub fn new(sx: usize, sy: usize, bx: usize, by: usize, a: f64) -> Result<Self> {
        if !(a.is_finite() && a > 0.0) {
            return Err(NlMeansError::invalid("a", "must be greater than 0"));
        }
        let target = AllocationTarget::KernelTable;
        let shape = (window_side(sy, target)?, window_side(sx, target)?);
        let mut table = try_zeroed(shape, target)?;
        let two_a2 = 2.0 * a * a;
        let (sx_i, sy_i) = (sx as isize, sy as isize);
        for ((r, c), value) in table.indexed_iter_mut() {
            let m = clamp_to_block(r as isize - sy_i, by as isize);
            let n = clamp_to_block(c as isize - sx_i, bx as isize);
            *value = (-(((m * m + n * n) as f64) / two_a2)).exp();
        }
        Ok(Self { table, sx, sy })
    }

    /// (sy, sx) patch radius.
    pub fn radius(&self) -> (usize, usize) {
        (self.sy, self.sx)
    }

    /// Weight at offset `(dy, dx)`; both must lie within the patch radius.
    #[inline]
    pub fn at(&self, dy: isize, dx: isize) -> f64 {
        self.table[[
            (dy + self.sy as isize) as usize,
            (dx + self.sx as isize) as usize,
        ]]
    }

    /// Row of weights for vertical offset `dy`, indexed by `dx + sx`.
    #[inline]
    pub fn row(&self, dy: isize) -> ArrayView1<'_, f64> {
        self.table.row((dy + self.sy as isize) as usize)
    }

    pub fn table(&self) -> &Array2<f64> {
        &self.table
    }
}
