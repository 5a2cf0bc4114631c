//! Block-based NL-means.
//!
//! The plane is cut into `(2·by+1) × (2·bx+1)` tiles. Every tile compares its
//! center patch against the candidates of the search window (across the frame
//! window in temporal mode) and spreads each weight over the block around the
//! candidate, so one search serves the whole tile.

use std::ops::RangeInclusive;

use ndarray::{s, ArrayView2, ArrayViewMut2};

use crate::accumulator::BlockAccumulator;
use crate::metric::{PatchMetric, PatchScorer};

/// Denoise one plane tile by tile.
///
/// `frames` holds the same plane of every frame in the window and
/// `frames[center]` is the one being denoised. `z_range` selects the frames
/// to search. Tile centers of the last row/column may lie past the plane
/// edge; only the in-plane part of a tile is written.
#[allow(clippy::too_many_arguments)]
pub(crate) fn denoise_plane<M: PatchMetric>(
    scorer: &PatchScorer<M>,
    search: (usize, usize),
    block: (usize, usize),
    frames: &[ArrayView2<u8>],
    center: usize,
    z_range: RangeInclusive<usize>,
    scratch: &mut BlockAccumulator,
    mut dst: ArrayViewMut2<u8>,
) {
    let target = frames[center];
    let (rows, cols) = target.dim();
    let (h, w) = (rows as isize, cols as isize);
    let (hm1, wm1) = (h - 1, w - 1);
    let (ay, ax) = (search.0.min(rows) as isize, search.1.min(cols) as isize);
    let (by, bx) = (block.0 as isize, block.1 as isize);
    let (byd, bxd) = (by * 2 + 1, bx * 2 + 1);

    for y in (by..h + by).step_by(byd as usize) {
        let start_y = (y - ay).max(by);
        let stop_y = (y + ay).min(hm1 - by.min(hm1 - y));
        let tile_h = byd.min(h - y + by);
        for x in (bx..w + bx).step_by(bxd as usize) {
            scratch.reset();
            let start_x = (x - ax).max(bx);
            let stop_x = (x + ax).min(wm1 - bx.min(wm1 - x));
            let tile_w = bxd.min(w - x + bx);

            for z in z_range.clone() {
                let candidate = frames[z];
                for u in start_y..=stop_y {
                    let rows_below = by.min(hm1 - u).min(hm1 - y);
                    for v in start_x..=stop_x {
                        if z == center && u == y && v == x {
                            continue;
                        }
                        let weight = scorer.weight(candidate, (u, v), target, (y, x));
                        let cols_right = bx.min(wm1 - v).min(wm1 - x);
                        scratch.smear(
                            candidate,
                            ((u - by) as usize, (v - bx) as usize),
                            ((rows_below + by + 1) as usize, (cols_right + bx + 1) as usize),
                            weight,
                        );
                    }
                }
            }

            let (r0, c0) = ((y - by) as usize, (x - bx) as usize);
            let tile = s![r0..r0 + tile_h as usize, c0..c0 + tile_w as usize];
            scratch.resolve_into(target.slice(tile), dst.slice_mut(tile));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::PixelAccumulator;
    use crate::error::AllocationTarget;
    use crate::kernel::GaussianKernel;
    use crate::metric::{Sad, Ssd};
    use crate::pixel;
    use ndarray::Array2;

    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u8(&mut self) -> u8 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (self.state >> 56) as u8
        }
    }

    fn random_plane(rows: usize, cols: usize, seed: u64) -> Array2<u8> {
        let mut rng = SimpleLcg::new(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.next_u8())
    }

    struct Params {
        search: (usize, usize),
        patch: (usize, usize),
        block: (usize, usize),
        a: f64,
        h: f64,
    }

    fn run_spatial<M: PatchMetric>(src: &Array2<u8>, p: &Params) -> Array2<u8> {
        let kernel = GaussianKernel::new(p.patch.1, p.patch.0, p.block.1, p.block.0, p.a).unwrap();
        let scorer = PatchScorer::<M>::new(&kernel, p.h);
        let mut scratch = BlockAccumulator::new(p.block.1, p.block.0).unwrap();
        let mut dst = Array2::from_elem(src.dim(), 0u8);
        denoise_plane(
            &scorer,
            p.search,
            p.block,
            &[src.view()],
            0,
            0..=0,
            &mut scratch,
            dst.view_mut(),
        );
        dst
    }

    #[test]
    fn test_zero_block_matches_pixel_mode() {
        let src = random_plane(11, 9, 42);
        let p = Params {
            search: (2, 3),
            patch: (1, 2),
            block: (0, 0),
            a: 1.0,
            h: 40.0,
        };
        let blocked = run_spatial::<Ssd>(&src, &p);

        let kernel = GaussianKernel::new(2, 1, 0, 0, 1.0).unwrap();
        let scorer = PatchScorer::<Ssd>::new(&kernel, 40.0);
        let mut acc = PixelAccumulator::new(11, 9, AllocationTarget::PlaneAccumulator).unwrap();
        let mut per_pixel = Array2::zeros((11, 9));
        pixel::denoise_plane(&scorer, (2, 3), src.view(), &mut acc, per_pixel.view_mut());

        assert_eq!(blocked, per_pixel);
    }

    #[test]
    fn test_flat_plane_is_unchanged() {
        let src = Array2::from_elem((10, 13), 200u8);
        for block in [(1, 1), (2, 1), (0, 2), (3, 3)] {
            let p = Params {
                search: (3, 3),
                patch: (3, 3),
                block,
                a: 1.0,
                h: 1.8,
            };
            assert_eq!(run_spatial::<Ssd>(&src, &p), src, "block {:?}", block);
            assert_eq!(run_spatial::<Sad>(&src, &p), src, "block {:?}", block);
        }
    }

    #[test]
    fn test_empty_search_window_returns_input() {
        let src = random_plane(7, 8, 5);
        let p = Params {
            search: (0, 0),
            patch: (2, 2),
            block: (1, 1),
            a: 1.0,
            h: 1.8,
        };
        assert_eq!(run_spatial::<Ssd>(&src, &p), src);
    }

    #[test]
    fn test_clipped_tiles_cover_every_pixel() {
        // None of these sizes is a multiple of the tile size.
        for (rows, cols) in [(4, 4), (5, 7), (1, 1), (2, 9), (8, 3)] {
            let src = random_plane(rows, cols, (rows * 31 + cols) as u64);
            let p = Params {
                search: (2, 2),
                patch: (2, 2),
                block: (1, 1),
                a: 1.0,
                h: 1e6,
            };
            // With a huge h every weight is ~1, so each pixel moves toward
            // the local mean and no output stays at the zero fill by accident.
            let out = run_spatial::<Sad>(&src, &p);
            assert_eq!(out.dim(), (rows, cols));
            let flat = Array2::from_elem((rows, cols), 77u8);
            assert_eq!(run_spatial::<Sad>(&flat, &p), flat);
        }
    }

    #[test]
    fn test_tile_shares_weights() {
        // Two flat halves: a tile fully inside one half averages only with
        // candidates that look like it.
        let src = Array2::from_shape_fn((9, 12), |(_, c)| if c < 6 { 20u8 } else { 220u8 });
        let p = Params {
            search: (3, 3),
            patch: (1, 1),
            block: (1, 1),
            a: 1.0,
            h: 2.0,
        };
        let out = run_spatial::<Ssd>(&src, &p);
        assert_eq!(out[[4, 1]], 20);
        assert_eq!(out[[4, 10]], 220);
    }

    #[test]
    fn test_temporal_window_of_identical_frames() {
        let plane = random_plane(6, 6, 77);
        let kernel = GaussianKernel::new(1, 1, 1, 1, 1.0).unwrap();
        let scorer = PatchScorer::<Ssd>::new(&kernel, 10.0);
        let mut scratch = BlockAccumulator::new(1, 1).unwrap();
        let views = [plane.view(), plane.view(), plane.view()];

        let mut spatial = Array2::zeros((6, 6));
        denoise_plane(
            &scorer,
            (0, 0),
            (1, 1),
            &views,
            1,
            1..=1,
            &mut scratch,
            spatial.view_mut(),
        );
        assert_eq!(spatial, plane);

        // Identical neighbours at the same position weigh 1, pulling nothing.
        let mut temporal = Array2::zeros((6, 6));
        denoise_plane(
            &scorer,
            (0, 0),
            (1, 1),
            &views,
            1,
            0..=2,
            &mut scratch,
            temporal.view_mut(),
        );
        assert_eq!(temporal, plane);
    }
}
