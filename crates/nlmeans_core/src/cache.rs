//! Ring buffer of source frames spanning the temporal window.
//!
//! Each slot keeps the frame it holds together with (in temporal pixel mode)
//! the partial sums other output frames already pushed into it, so moving the
//! window by one frame only costs one new frame's worth of comparisons.

use std::sync::Arc;

use tracing::trace;

use crate::accumulator::{window_side, PixelAccumulator};
use crate::error::{AllocationTarget, NlMeansError, Result};
use crate::frame::{Frame, FrameSource, VideoInfo};

/// Progress of the pair (this frame, frame at a relative window offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairState {
    #[default]
    Open,
    /// Being scanned while producing the current output frame.
    Touched,
    /// Weights for the pair are already in both frames' accumulators.
    Resolved,
}

/// One slot of the [`FrameCache`].
#[derive(Debug)]
pub struct CachedFrame {
    frame: Option<Arc<Frame>>,
    /// Logical (unclamped) window index, `None` while empty.
    index: Option<i64>,
    accumulators: Vec<PixelAccumulator>,
    pairs: Vec<PairState>,
}

impl CachedFrame {
    fn new(info: &VideoInfo, window_len: usize, with_accumulators: bool) -> Result<Self> {
        let (accumulators, pairs) = if with_accumulators {
            let accumulators = (0..info.num_planes)
                .map(|plane| {
                    let (rows, cols) = info.plane_dim(plane);
                    PixelAccumulator::new(rows, cols, AllocationTarget::FrameCacheSlot)
                })
                .collect::<Result<Vec<_>>>()?;
            let mut pairs = Vec::new();
            pairs
                .try_reserve_exact(window_len)
                .map_err(|_| NlMeansError::Allocation {
                    target: AllocationTarget::FrameCacheSlot,
                })?;
            pairs.resize(window_len, PairState::Open);
            (accumulators, pairs)
        } else {
            (Vec::new(), Vec::new())
        };
        Ok(Self {
            frame: None,
            index: None,
            accumulators,
            pairs,
        })
    }

    pub fn index(&self) -> Option<i64> {
        self.index
    }

    pub fn frame(&self) -> Option<&Arc<Frame>> {
        self.frame.as_ref()
    }

    /// Replace the held frame, dropping every partial sum and pair state.
    fn load(&mut self, index: i64, frame: Arc<Frame>) {
        self.frame = Some(frame);
        self.index = Some(index);
        self.accumulators.iter_mut().for_each(PixelAccumulator::reset);
        self.pairs.fill(PairState::Open);
    }

    pub fn accumulator(&self, plane: usize) -> &PixelAccumulator {
        &self.accumulators[plane]
    }

    pub fn accumulator_mut(&mut self, plane: usize) -> &mut PixelAccumulator {
        &mut self.accumulators[plane]
    }

    pub fn pair(&self, offset: usize) -> PairState {
        self.pairs[offset]
    }

    pub fn set_pair(&mut self, offset: usize, state: PairState) {
        self.pairs[offset] = state;
    }
}

/// Fixed-capacity ring of `2·az + 1` [`CachedFrame`]s.
///
/// Logical index `i` (0 = oldest) lives in physical slot `(start + i) % len`.
#[derive(Debug)]
pub struct FrameCache {
    info: VideoInfo,
    slots: Vec<CachedFrame>,
    start: usize,
}

impl FrameCache {
    pub fn new(info: &VideoInfo, az: usize, with_accumulators: bool) -> Result<Self> {
        let target = AllocationTarget::FrameCacheSlot;
        let len = window_side(az, target)?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| NlMeansError::Allocation { target })?;
        for _ in 0..len {
            slots.push(CachedFrame::new(info, len, with_accumulators)?);
        }
        Ok(Self {
            info: *info,
            slots,
            start: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Physical slot of logical index `logical`.
    #[inline]
    pub fn position(&self, logical: usize) -> usize {
        (self.start + logical) % self.slots.len()
    }

    pub fn slot(&self, logical: usize) -> &CachedFrame {
        &self.slots[self.position(logical)]
    }

    /// Rotate so that the first resident frame of `first..=last` lands on its
    /// logical position. Leaves `start` alone if none is resident.
    pub fn realign(&mut self, first: i64, last: i64) {
        let len = self.slots.len() as i64;
        for wanted in first..=last {
            if let Some(physical) = self.slots.iter().position(|s| s.index == Some(wanted)) {
                let start = (physical as i64 - (wanted - first)).rem_euclid(len);
                if start as usize != self.start {
                    trace!(from = self.start, to = start, anchor = wanted, "frame cache realigned");
                }
                self.start = start as usize;
                return;
            }
        }
    }

    /// Make the cache hold the window `n - az ..= n + az`, fetching (oldest
    /// first) every frame not already resident. Returns the frames in logical
    /// order.
    pub fn refresh<S>(&mut self, n: usize, source: &S) -> Result<Vec<Arc<Frame>>>
    where
        S: FrameSource + ?Sized,
    {
        let az = (self.slots.len() / 2) as i64;
        let first = n as i64 - az;
        let last = n as i64 + az;
        self.realign(first, last);

        let mut frames = Vec::with_capacity(self.slots.len());
        for (logical, wanted) in (first..=last).enumerate() {
            let physical = self.position(logical);
            let slot = &mut self.slots[physical];
            let resident = match (&slot.frame, slot.index) {
                (Some(frame), Some(index)) if index == wanted => Some(Arc::clone(frame)),
                _ => None,
            };
            let frame = match resident {
                Some(frame) => frame,
                None => {
                    let clamped = self.info.clamp_index(wanted);
                    let frame = source.fetch(clamped)?;
                    if !frame.matches(&self.info) {
                        return Err(NlMeansError::Source {
                            index: clamped,
                            reason: "geometry does not match the clip".to_string(),
                        });
                    }
                    trace!(slot = physical, index = wanted, source = clamped, "frame cache refetch");
                    slot.load(wanted, Arc::clone(&frame));
                    frame
                }
            };
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Every slot, oldest first.
    pub fn logical_slots_mut(&mut self) -> Vec<&mut CachedFrame> {
        let mut slots: Vec<&mut CachedFrame> = self.slots.iter_mut().collect();
        slots.rotate_left(self.start);
        slots
    }
}
