//! Weighted-average accumulators.
//!
//! Both kinds follow the same two-phase pattern: weights are accumulated
//! into dense arrays while candidates are scanned, then each pixel is
//! normalized once with its self weight.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Zip};

use crate::error::{AllocationTarget, NlMeansError, Result};

/// Weights at or below this count as "no candidate contributed".
const WEIGHT_EPSILON: f64 = f64::EPSILON;

/// Allocate a zero-filled array, reporting failure instead of aborting.
pub(crate) fn try_zeroed(shape: (usize, usize), target: AllocationTarget) -> Result<Array2<f64>> {
    let len = shape
        .0
        .checked_mul(shape.1)
        .ok_or(NlMeansError::Allocation { target })?;
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| NlMeansError::Allocation { target })?;
    data.resize(len, 0.0);
    Array2::from_shape_vec(shape, data).map_err(|_| NlMeansError::Allocation { target })
}

/// Side `2·radius + 1` of a window, with overflow reported against `target`.
pub(crate) fn window_side(radius: usize, target: AllocationTarget) -> Result<usize> {
    radius
        .checked_mul(2)
        .and_then(|v| v.checked_add(1))
        .ok_or(NlMeansError::Allocation { target })
}

/// Self weight of a pixel: the largest candidate weight, or 1 if nothing
/// contributed.
#[inline]
fn self_weight(max_weight: f64) -> f64 {
    if max_weight <= WEIGHT_EPSILON {
        1.0
    } else {
        max_weight
    }
}

#[inline]
fn round_to_u8(value: f64) -> u8 {
    ((value + 0.5) as i32).clamp(0, 255) as u8
}

/// Dense (sum, weight, max weight) over a whole plane.
#[derive(Debug, Clone)]
pub struct PixelAccumulator {
    sum: Array2<f64>,
    weight: Array2<f64>,
    max_weight: Array2<f64>,
}

impl PixelAccumulator {
    pub fn new(rows: usize, cols: usize, target: AllocationTarget) -> Result<Self> {
        Ok(Self {
            sum: try_zeroed((rows, cols), target)?,
            weight: try_zeroed((rows, cols), target)?,
            max_weight: try_zeroed((rows, cols), target)?,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.sum.dim()
    }

    pub fn reset(&mut self) {
        self.sum.fill(0.0);
        self.weight.fill(0.0);
        self.max_weight.fill(0.0);
    }

    /// Add `value` with weight `w` to the pixel at `pos`.
    #[inline(always)]
    pub fn add(&mut self, pos: [usize; 2], value: u8, w: f64) {
        self.weight[pos] += w;
        self.sum[pos] += f64::from(value) * w;
        let max = &mut self.max_weight[pos];
        if w > *max {
            *max = w;
        }
    }

    /// Final value of the pixel at `pos` whose own source value is `own`.
    ///
    /// The self term is applied to a copy, so the stored sums stay reusable.
    #[inline]
    pub fn resolve(&self, pos: [usize; 2], own: u8) -> u8 {
        let wmax = self_weight(self.max_weight[pos]);
        let sum = self.sum[pos] + f64::from(own) * wmax;
        let weight = self.weight[pos] + wmax;
        round_to_u8(sum / weight)
    }

    pub fn sum(&self) -> &Array2<f64> {
        &self.sum
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn max_weight(&self) -> &Array2<f64> {
        &self.max_weight
    }
}

/// (sum, weight) scratch for one `(2·by+1) × (2·bx+1)` output tile, plus the
/// tile-wide maximum weight.
#[derive(Debug, Clone)]
pub struct BlockAccumulator {
    sum: Array2<f64>,
    weight: Array2<f64>,
    max_weight: f64,
}

impl BlockAccumulator {
    pub fn new(bx: usize, by: usize) -> Result<Self> {
        let target = AllocationTarget::BlockScratch;
        let shape = (window_side(by, target)?, window_side(bx, target)?);
        Ok(Self {
            sum: try_zeroed(shape, AllocationTarget::BlockScratch)?,
            weight: try_zeroed(shape, AllocationTarget::BlockScratch)?,
            max_weight: 0.0,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.sum.dim()
    }

    pub fn reset(&mut self) {
        self.sum.fill(0.0);
        self.weight.fill(0.0);
        self.max_weight = 0.0;
    }

    /// Spread weight `w` over the footprint `source[origin .. origin + extent]`,
    /// aligned with the top-left corner of the tile.
    #[inline]
    pub fn smear(
        &mut self,
        source: ArrayView2<u8>,
        origin: (usize, usize),
        extent: (usize, usize),
        w: f64,
    ) {
        let (r0, c0) = origin;
        let (rows, cols) = extent;
        let footprint = source.slice(s![r0..r0 + rows, c0..c0 + cols]);
        Zip::from(self.sum.slice_mut(s![..rows, ..cols]))
            .and(self.weight.slice_mut(s![..rows, ..cols]))
            .and(&footprint)
            .for_each(|sum, weight, &value| {
                *sum += f64::from(value) * w;
                *weight += w;
            });
        if w > self.max_weight {
            self.max_weight = w;
        }
    }

    /// Normalize the tile into `dst`; `src` is the source tile at the same
    /// place. Both may be clipped smaller than the scratch.
    pub fn resolve_into(&self, src: ArrayView2<u8>, mut dst: ArrayViewMut2<u8>) {
        let wmax = self_weight(self.max_weight);
        let (rows, cols) = src.dim();
        Zip::from(&mut dst)
            .and(&src)
            .and(self.sum.slice(s![..rows, ..cols]))
            .and(self.weight.slice(s![..rows, ..cols]))
            .for_each(|out, &own, &sum, &weight| {
                let sum = sum + f64::from(own) * wmax;
                let weight = weight + wmax;
                *out = round_to_u8(sum / weight);
            });
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub fn sum(&self) -> &Array2<f64> {
        &self.sum
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }
}
