//! Per-pixel NL-means.
//!
//! Within one frame only the causal half of the search window is scanned and
//! every weight is applied to both pixels of the pair. Across frames the
//! [`FrameCache`](crate::cache::FrameCache) carries the partial sums, and the
//! pair states decide which side of a cross-frame pair still needs the weight.

use std::ops::RangeInclusive;
use std::sync::Arc;

use ndarray::{ArrayView2, ArrayViewMut2};

use crate::accumulator::PixelAccumulator;
use crate::cache::{CachedFrame, PairState};
use crate::frame::Frame;
use crate::metric::{PatchMetric, PatchScorer};

/// Visit every candidate `(u, v)` of the `search = (ay, ax)` window around
/// `pos` with its patch weight against `target`.
///
/// With `causal` only candidates after `pos` in raster order are visited.
#[inline(always)]
fn scan_window<M, V>(
    scorer: &PatchScorer<M>,
    candidate: ArrayView2<u8>,
    target: ArrayView2<u8>,
    pos: (usize, usize),
    search: (usize, usize),
    causal: bool,
    mut visit: V,
) where
    M: PatchMetric,
    V: FnMut(usize, usize, f64),
{
    let (y, x) = pos;
    let (ay, ax) = search;
    let (rows, cols) = target.dim();
    let start_y = if causal { y } else { y.saturating_sub(ay) };
    let stop_y = y.saturating_add(ay).min(rows - 1);
    let window_start_x = x.saturating_sub(ax);
    let stop_x = x.saturating_add(ax).min(cols - 1);
    let tpos = (y as isize, x as isize);
    for u in start_y..=stop_y {
        let start_x = if causal && u == y { x + 1 } else { window_start_x };
        for v in start_x..=stop_x {
            let w = scorer.weight(candidate, (u as isize, v as isize), target, tpos);
            visit(u, v, w);
        }
    }
}

/// Two distinct elements of `items` borrowed mutably at once.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut needs two distinct indices");
    if a < b {
        let (head, tail) = items.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

/// Denoise one plane without a frame window.
pub(crate) fn denoise_plane<M: PatchMetric>(
    scorer: &PatchScorer<M>,
    search: (usize, usize),
    src: ArrayView2<u8>,
    acc: &mut PixelAccumulator,
    mut dst: ArrayViewMut2<u8>,
) {
    acc.reset();
    let (rows, cols) = src.dim();
    for y in 0..rows {
        for x in 0..cols {
            let own = src[[y, x]];
            scan_window(scorer, src, src, (y, x), search, true, |u, v, w| {
                acc.add([y, x], src[[u, v]], w);
                acc.add([u, v], own, w);
            });
            dst[[y, x]] = acc.resolve([y, x], own);
        }
    }
}

/// Denoise the center frame of a temporal window.
///
/// `slots` and `frames` are the cache contents oldest first, the output frame
/// sits in the middle. `z_range` is the part of the window inside the clip.
pub(crate) fn denoise_window<M: PatchMetric>(
    scorer: &PatchScorer<M>,
    search: (usize, usize),
    slots: &mut [&mut CachedFrame],
    frames: &[Arc<Frame>],
    z_range: RangeInclusive<usize>,
    dst: &mut Frame,
) {
    let size = slots.len();
    let center = size / 2;

    // Pairs resolved by an earlier output frame are skipped entirely; `mirror`
    // tells whether the other frame still wants this pass's weights.
    let mut active = vec![false; size];
    let mut mirror = vec![false; size];
    for z in z_range.clone() {
        if slots[center].pair(z) != PairState::Resolved {
            active[z] = true;
            slots[center].set_pair(z, PairState::Touched);
        }
        mirror[z] = z == center || slots[z].pair(2 * center - z) != PairState::Resolved;
    }

    let source = &frames[center];
    for plane in 0..source.num_planes() {
        let target = source.plane(plane);
        let mut out = dst.plane_mut(plane);
        let mut accs: Vec<&mut PixelAccumulator> = slots
            .iter_mut()
            .map(|slot| slot.accumulator_mut(plane))
            .collect();
        let (rows, cols) = target.dim();
        for y in 0..rows {
            for x in 0..cols {
                let own = target[[y, x]];
                for z in z_range.clone() {
                    if !active[z] {
                        continue;
                    }
                    let candidate = frames[z].plane(plane);
                    if z == center {
                        let acc = &mut *accs[center];
                        scan_window(scorer, candidate, target, (y, x), search, true, |u, v, w| {
                            acc.add([y, x], candidate[[u, v]], w);
                            acc.add([u, v], own, w);
                        });
                    } else {
                        let (acc, other) = pair_mut(&mut accs, center, z);
                        let mirrored = mirror[z];
                        scan_window(scorer, candidate, target, (y, x), search, false, |u, v, w| {
                            acc.add([y, x], candidate[[u, v]], w);
                            if mirrored {
                                other.add([u, v], own, w);
                            }
                        });
                    }
                }
                out[[y, x]] = accs[center].resolve([y, x], own);
            }
        }
    }

    for i in 0..size {
        if slots[center].pair(i) == PairState::Touched {
            slots[center].set_pair(i, PairState::Resolved);
            slots[i].set_pair(size - 1 - i, PairState::Resolved);
        }
    }
}
