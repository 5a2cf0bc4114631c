//! Frame-level driver.
//!
//! [`NlMeans`] owns one [`EngineSlot`] per worker. Each request claims a
//! slot, runs the variant the configuration selects and releases the slot,
//! so requests for different frames can run concurrently.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;

use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::block;
use crate::config::{resolve_profile_timing, Metric, NlMeansConfig};
use crate::error::{NlMeansError, Result};
use crate::frame::{Frame, FrameSink, FrameSource, HeapFrameSink, VideoInfo};
use crate::metric::{PatchMetric, PatchScorer, Sad, Ssd};
use crate::pixel;
use crate::slots::{EngineSlot, Scratch, SlotPool};

/// NL-means denoiser over a frame source.
pub struct NlMeans<S, K = HeapFrameSink> {
    config: NlMeansConfig,
    info: VideoInfo,
    source: S,
    sink: K,
    pool: SlotPool<EngineSlot>,
    profile_timing: bool,
}

impl<S: FrameSource, K: FrameSink> NlMeans<S, K> {
    /// Build a denoiser with one slot per thread of the current rayon pool.
    pub fn new(config: NlMeansConfig, source: S, sink: K) -> Result<Self> {
        Self::with_threads(config, source, sink, rayon::current_num_threads())
    }

    /// Build a denoiser with `threads` slots.
    ///
    /// Every slot is allocated up front; any failure aborts construction.
    pub fn with_threads(config: NlMeansConfig, source: S, sink: K, threads: usize) -> Result<Self> {
        config.validate()?;
        if threads == 0 {
            return Err(NlMeansError::invalid("threads", "must be at least 1"));
        }
        let info = *source.info();
        info.validate()?;

        let slots = (0..threads)
            .map(|_| EngineSlot::new(&config, &info))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            variant = ?config.variant(),
            metric = ?config.metric(),
            slots = threads,
            width = info.width,
            height = info.height,
            planes = info.num_planes,
            frames = info.num_frames,
            "nlmeans engine ready"
        );

        Ok(Self {
            config,
            info,
            source,
            sink,
            pool: SlotPool::new(slots),
            profile_timing: resolve_profile_timing(),
        })
    }

    pub fn config(&self) -> &NlMeansConfig {
        &self.config
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn num_slots(&self) -> usize {
        self.pool.len()
    }

    /// Source frames output frame `n` reads, oldest first. Window positions
    /// past either end of the clip repeat the edge frame.
    pub fn required_frames(&self, n: usize) -> Vec<usize> {
        let az = self.config.az as i64;
        let n = n as i64;
        (n - az..=n + az)
            .map(|index| self.info.clamp_index(index))
            .collect()
    }

    /// Denoise frame `n`.
    pub fn get_frame(&self, n: usize) -> Result<Frame> {
        if n >= self.info.num_frames {
            return Err(NlMeansError::FrameOutOfRange {
                index: n,
                count: self.info.num_frames,
            });
        }
        let started = self.profile_timing.then(Instant::now);

        let mut slot = self.pool.claim();
        let slot_index = slot.index();
        let result = match self.config.metric() {
            Metric::Sad => self.render::<Sad>(&mut slot, n),
            Metric::Ssd => self.render::<Ssd>(&mut slot, n),
        };
        drop(slot);

        if let Some(started) = started {
            info!(
                frame = n,
                slot = slot_index,
                variant = ?self.config.variant(),
                ok = result.is_ok(),
                wall_ms = started.elapsed().as_secs_f64() * 1000.0,
                "nlmeans_profile"
            );
        }
        result
    }

    /// Denoise every frame of the clip on the rayon pool.
    ///
    /// Results are in frame order; a failed frame does not stop the others.
    pub fn process_clip(&self) -> Vec<Result<Frame>> {
        (0..self.info.num_frames)
            .into_par_iter()
            .map(|n| self.get_frame(n))
            .collect()
    }

    /// Window offsets of frame `n` that fall inside the clip.
    fn z_range(&self, n: usize) -> RangeInclusive<usize> {
        let az = self.config.az;
        let after = self.info.num_frames - n - 1;
        (az - n.min(az))..=(az + after.min(az))
    }

    fn fetch(&self, n: usize) -> Result<Arc<Frame>> {
        let frame = self.source.fetch(n)?;
        if !frame.matches(&self.info) {
            return Err(NlMeansError::Source {
                index: n,
                reason: "geometry does not match the clip".to_string(),
            });
        }
        Ok(frame)
    }

    fn allocate(&self, n: usize, template: &Frame) -> Result<Frame> {
        match self.sink.allocate(template) {
            Some(frame) if frame.matches(&self.info) => Ok(frame),
            Some(_) => {
                warn!(frame = n, "output frame has the wrong geometry");
                Err(NlMeansError::FrameAllocation { index: n })
            }
            None => {
                warn!(frame = n, "output frame allocation failed");
                Err(NlMeansError::FrameAllocation { index: n })
            }
        }
    }

    fn render<M: PatchMetric>(&self, slot: &mut EngineSlot, n: usize) -> Result<Frame> {
        let search = (self.config.ay, self.config.ax);
        let block_radius = (self.config.by, self.config.bx);
        let center = self.config.az;
        let scorer = PatchScorer::<M>::new(&slot.kernel, self.config.h);

        match &mut slot.scratch {
            Scratch::SpatialPixel(planes) => {
                let src = self.fetch(n)?;
                let mut dst = self.allocate(n, &src)?;
                for (plane, acc) in planes.iter_mut().enumerate() {
                    pixel::denoise_plane(&scorer, search, src.plane(plane), acc, dst.plane_mut(plane));
                }
                Ok(dst)
            }
            Scratch::SpatialBlock(scratch) => {
                let src = self.fetch(n)?;
                let mut dst = self.allocate(n, &src)?;
                for plane in 0..src.num_planes() {
                    block::denoise_plane(
                        &scorer,
                        search,
                        block_radius,
                        &[src.plane(plane)],
                        0,
                        0..=0,
                        scratch,
                        dst.plane_mut(plane),
                    );
                }
                Ok(dst)
            }
            Scratch::TemporalPixel(cache) => {
                let frames = cache.refresh(n, &self.source)?;
                let mut dst = self.allocate(n, &frames[center])?;
                let mut slots = cache.logical_slots_mut();
                pixel::denoise_window(&scorer, search, &mut slots, &frames, self.z_range(n), &mut dst);
                Ok(dst)
            }
            Scratch::TemporalBlock(cache, scratch) => {
                let frames = cache.refresh(n, &self.source)?;
                let mut dst = self.allocate(n, &frames[center])?;
                for plane in 0..dst.num_planes() {
                    let views: Vec<ArrayView2<u8>> = frames.iter().map(|f| f.plane(plane)).collect();
                    block::denoise_plane(
                        &scorer,
                        search,
                        block_radius,
                        &views,
                        center,
                        self.z_range(n),
                        scratch,
                        dst.plane_mut(plane),
                    );
                }
                Ok(dst)
            }
        }
    }
}
