//! NL-means Core Library
//!
//! Non-Local-Means denoising for planar 8-bit video. Each output pixel is a
//! weighted average of pixels whose surrounding patch looks like its own,
//! searched over a spatial window and optionally over neighbouring frames.
//! Four variants are provided: per-pixel or per-block, each spatial-only or
//! temporal.

pub mod accumulator;
mod block;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod kernel;
pub mod metric;
mod pixel;
pub mod slots;

// Re-export commonly used types at the crate root
pub use config::{Metric, NlMeansConfig, Variant};
pub use engine::NlMeans;
pub use error::{AllocationTarget, NlMeansError, Result};
pub use frame::{Frame, FrameSink, FrameSource, HeapFrameSink, MemoryClip, VideoInfo};
pub use kernel::GaussianKernel;
pub use metric::{patch_weight, PatchMetric, PatchScorer, Sad, Ssd};
