//! Per-worker scratch state and the pool that hands it out.

use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::accumulator::{BlockAccumulator, PixelAccumulator};
use crate::cache::FrameCache;
use crate::config::{NlMeansConfig, Variant};
use crate::error::{AllocationTarget, Result};
use crate::frame::VideoInfo;
use crate::kernel::GaussianKernel;

/// Scratch owned by a slot, shaped by the variant it serves.
#[derive(Debug)]
pub enum Scratch {
    /// One whole-plane accumulator per plane.
    SpatialPixel(Vec<PixelAccumulator>),
    SpatialBlock(BlockAccumulator),
    /// Frame window whose slots carry their own accumulators.
    TemporalPixel(FrameCache),
    TemporalBlock(FrameCache, BlockAccumulator),
}

/// Everything one in-flight frame request needs exclusively.
#[derive(Debug)]
pub struct EngineSlot {
    pub(crate) kernel: GaussianKernel,
    pub(crate) scratch: Scratch,
}

impl EngineSlot {
    pub fn new(config: &NlMeansConfig, info: &VideoInfo) -> Result<Self> {
        let kernel = GaussianKernel::new(config.sx, config.sy, config.bx, config.by, config.a)?;
        let scratch = match config.variant() {
            Variant::SpatialPixel => Scratch::SpatialPixel(
                (0..info.num_planes)
                    .map(|plane| {
                        let (rows, cols) = info.plane_dim(plane);
                        PixelAccumulator::new(rows, cols, AllocationTarget::PlaneAccumulator)
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Variant::SpatialBlock => {
                Scratch::SpatialBlock(BlockAccumulator::new(config.bx, config.by)?)
            }
            Variant::TemporalPixel => Scratch::TemporalPixel(FrameCache::new(info, config.az, true)?),
            Variant::TemporalBlock => Scratch::TemporalBlock(
                FrameCache::new(info, config.az, false)?,
                BlockAccumulator::new(config.bx, config.by)?,
            ),
        };
        Ok(Self { kernel, scratch })
    }

    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

/// Fixed set of slots claimed exclusively by callers.
///
/// `claim` blocks on a condition variable while every slot is busy. There is
/// no fairness between waiters.
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Mutex<T>>,
    busy: Mutex<Vec<bool>>,
    released: Condvar,
}

impl<T> SlotPool<T> {
    pub fn new(slots: Vec<T>) -> Self {
        let busy = vec![false; slots.len()];
        Self {
            slots: slots.into_iter().map(Mutex::new).collect(),
            busy: Mutex::new(busy),
            released: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Claim a free slot, waiting for a release if none is free.
    pub fn claim(&self) -> SlotGuard<'_, T> {
        let mut busy = self.busy.lock();
        loop {
            if let Some(index) = Self::mark_free(&mut busy) {
                drop(busy);
                return self.guard(index);
            }
            self.released.wait(&mut busy);
        }
    }

    /// Claim a free slot without waiting.
    pub fn try_claim(&self) -> Option<SlotGuard<'_, T>> {
        let index = Self::mark_free(&mut self.busy.lock())?;
        Some(self.guard(index))
    }

    fn mark_free(busy: &mut [bool]) -> Option<usize> {
        let index = busy.iter().position(|b| !*b)?;
        busy[index] = true;
        Some(index)
    }

    fn guard(&self, index: usize) -> SlotGuard<'_, T> {
        SlotGuard {
            pool: self,
            index,
            inner: self.slots[index].lock(),
        }
    }

    fn release(&self, index: usize) {
        self.busy.lock()[index] = false;
        self.released.notify_one();
    }
}

/// Exclusive access to one slot; the slot is released on drop.
pub struct SlotGuard<'a, T> {
    pool: &'a SlotPool<T>,
    index: usize,
    inner: MutexGuard<'a, T>,
}

impl<T> SlotGuard<'_, T> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for SlotGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for SlotGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
