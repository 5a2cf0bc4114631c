//! Patch distance and patch-to-patch weights.
//!
//! The metric is a type parameter so the SAD/SSD choice is made once per
//! engine and the inner loops are monomorphized.

use std::marker::PhantomData;

use ndarray::ArrayView2;

use crate::config::Metric;
use crate::kernel::GaussianKernel;

/// Per-sample distance and the matching bandwidth scaling.
pub trait PatchMetric: Copy + Send + Sync + 'static {
    const METRIC: Metric;

    /// Unweighted distance between two samples.
    fn distance(a: u8, b: u8) -> f64;

    /// Negative reciprocal of the bandwidth applied to the normalized distance.
    fn scale(h: f64) -> f64;
}

/// Sum of absolute differences, scaled by `-1/h`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sad;

/// Sum of squared differences, scaled by `-1/h²`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssd;

impl PatchMetric for Sad {
    const METRIC: Metric = Metric::Sad;

    #[inline(always)]
    fn distance(a: u8, b: u8) -> f64 {
        f64::from(a.abs_diff(b))
    }

    fn scale(h: f64) -> f64 {
        -1.0 / h
    }
}

impl PatchMetric for Ssd {
    const METRIC: Metric = Metric::Ssd;

    #[inline(always)]
    fn distance(a: u8, b: u8) -> f64 {
        let d = f64::from(a) - f64::from(b);
        d * d
    }

    fn scale(h: f64) -> f64 {
        -1.0 / (h * h)
    }
}

/// Weight from a kernel-weighted distance and the kernel mass it covered.
#[inline(always)]
pub fn patch_weight(diff: f64, gweights: f64, scale: f64) -> f64 {
    (diff / gweights * scale).exp()
}

/// Patch offsets (inclusive, relative to the patch centers) that stay inside
/// the plane around both the candidate and the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchExtent {
    pub top: isize,
    pub bottom: isize,
    pub left: isize,
    pub right: isize,
}

impl PatchExtent {
    /// `candidate` and `target` are (row, col) centers in a `dims` plane.
    #[inline(always)]
    pub fn clipped(
        radius: (usize, usize),
        candidate: (isize, isize),
        target: (isize, isize),
        dims: (usize, usize),
    ) -> Self {
        let (sy, sx) = (radius.0 as isize, radius.1 as isize);
        let (u, v) = candidate;
        let (y, x) = target;
        let hm1 = dims.0 as isize - 1;
        let wm1 = dims.1 as isize - 1;
        Self {
            top: -sy.min(u).min(y),
            bottom: sy.min(hm1 - u).min(hm1 - y),
            left: -sx.min(v).min(x),
            right: sx.min(wm1 - v).min(wm1 - x),
        }
    }
}

/// Scores candidate patches against a target patch with a fixed metric,
/// kernel and bandwidth.
#[derive(Debug, Clone, Copy)]
pub struct PatchScorer<'k, M: PatchMetric> {
    kernel: &'k GaussianKernel,
    scale: f64,
    _metric: PhantomData<M>,
}

impl<'k, M: PatchMetric> PatchScorer<'k, M> {
    pub fn new(kernel: &'k GaussianKernel, h: f64) -> Self {
        Self {
            kernel,
            scale: M::scale(h),
            _metric: PhantomData,
        }
    }

    pub fn kernel(&self) -> &GaussianKernel {
        self.kernel
    }

    /// Kernel-weighted distance and the kernel mass used, over the clipped
    /// extent of the two patches.
    #[inline(always)]
    pub fn distance(
        &self,
        candidate: ArrayView2<u8>,
        cpos: (isize, isize),
        target: ArrayView2<u8>,
        tpos: (isize, isize),
    ) -> (f64, f64) {
        let (sy, sx) = self.kernel.radius();
        let ext = PatchExtent::clipped((sy, sx), cpos, tpos, target.dim());
        let (u, v) = cpos;
        let (y, x) = tpos;
        let mut diff = 0.0;
        let mut gweights = 0.0;
        for j in ext.top..=ext.bottom {
            let g = self.kernel.row(j);
            let c_row = candidate.row((u + j) as usize);
            let t_row = target.row((y + j) as usize);
            for k in ext.left..=ext.right {
                let gw = g[(k + sx as isize) as usize];
                diff += gw * M::distance(c_row[(v + k) as usize], t_row[(x + k) as usize]);
                gweights += gw;
            }
        }
        (diff, gweights)
    }

    /// Similarity weight in (0, 1] between the two patches.
    #[inline(always)]
    pub fn weight(
        &self,
        candidate: ArrayView2<u8>,
        cpos: (isize, isize),
        target: ArrayView2<u8>,
        tpos: (isize, isize),
    ) -> f64 {
        let (diff, gweights) = self.distance(candidate, cpos, target, tpos);
        patch_weight(diff, gweights, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(rows: usize, cols: usize) -> Array2<u8> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * 16 + c * 3) as u8)
    }

    #[test]
    fn test_sample_distances() {
        assert_eq!(Sad::distance(3, 10), 7.0);
        assert_eq!(Sad::distance(10, 3), 7.0);
        assert_eq!(Ssd::distance(3, 10), 49.0);
        assert_eq!(Ssd::distance(255, 0), 65025.0);
    }

    #[test]
    fn test_scales() {
        assert_eq!(Sad::scale(4.0), -0.25);
        assert_eq!(Ssd::scale(4.0), -1.0 / 16.0);
        assert_eq!(Sad::METRIC, Metric::Sad);
        assert_eq!(Ssd::METRIC, Metric::Ssd);
    }

    #[test]
    fn test_weight_is_one_at_zero_distance() {
        assert_eq!(patch_weight(0.0, 3.5, Ssd::scale(1.8)), 1.0);
    }

    #[test]
    fn test_weight_is_monotone_and_bounded() {
        let scale = Sad::scale(10.0);
        let mut last = patch_weight(0.0, 1.0, scale);
        for step in 1..50 {
            let w = patch_weight(step as f64 * 0.7, 1.0, scale);
            assert!(w <= last);
            assert!(w > 0.0 && w <= 1.0);
            last = w;
        }
    }

    #[test]
    fn test_extent_never_leaves_plane_at_corner() {
        let ext = PatchExtent::clipped((3, 3), (0, 0), (0, 0), (16, 16));
        assert_eq!(ext.top, 0);
        assert_eq!(ext.left, 0);
        assert_eq!(ext.bottom, 3);
        assert_eq!(ext.right, 3);

        // Every candidate within a radius-3 window of the origin.
        for u in 0..=3isize {
            for v in 0..=3isize {
                let ext = PatchExtent::clipped((3, 3), (u, v), (0, 0), (16, 16));
                assert!(u + ext.top >= 0 && ext.top <= 0);
                assert!(v + ext.left >= 0 && ext.left <= 0);
            }
        }
    }

    #[test]
    fn test_extent_clips_against_far_edge() {
        let ext = PatchExtent::clipped((2, 2), (7, 6), (5, 7), (8, 8));
        assert_eq!(ext.bottom, 0);
        assert_eq!(ext.right, 0);
        assert_eq!(ext.top, -2);
        assert_eq!(ext.left, -2);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let img = ramp(8, 8);
        let kernel = GaussianKernel::new(2, 2, 0, 0, 1.0).unwrap();
        let scorer = PatchScorer::<Ssd>::new(&kernel, 5.0);
        let ab = scorer.distance(img.view(), (2, 5), img.view(), (4, 1));
        let ba = scorer.distance(img.view(), (4, 1), img.view(), (2, 5));
        assert_eq!(ab, ba);
        assert!(ab.0 > 0.0);
    }

    #[test]
    fn test_distance_matches_direct_sum() {
        let img = ramp(6, 6);
        let kernel = GaussianKernel::new(1, 1, 0, 0, 0.9).unwrap();
        let scorer = PatchScorer::<Sad>::new(&kernel, 3.0);
        let (diff, gweights) = scorer.distance(img.view(), (0, 2), img.view(), (1, 3));

        let mut expected_diff = 0.0;
        let mut expected_g = 0.0;
        // Row offset -1 is clipped by the candidate sitting on row 0.
        for j in 0..=1isize {
            for k in -1..=1isize {
                let a = img[[j as usize, (2 + k) as usize]];
                let b = img[[(1 + j) as usize, (3 + k) as usize]];
                let g = kernel.at(j, k);
                expected_diff += g * f64::from(a.abs_diff(b));
                expected_g += g;
            }
        }
        assert!((diff - expected_diff).abs() < 1e-12);
        assert!((gweights - expected_g).abs() < 1e-12);
    }

    #[test]
    fn test_identical_patches_weigh_one() {
        let img = Array2::from_elem((5, 5), 42u8);
        let kernel = GaussianKernel::new(2, 2, 0, 0, 1.0).unwrap();
        let scorer = PatchScorer::<Ssd>::new(&kernel, 1.8);
        assert_eq!(scorer.weight(img.view(), (1, 1), img.view(), (3, 3)), 1.0);
    }
}
