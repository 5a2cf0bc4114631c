//! Error types shared by every stage of the denoiser.

use std::fmt;

use thiserror::Error;

/// Structure whose backing storage could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationTarget {
    /// Gaussian weight table of a slot.
    KernelTable,
    /// Frame cache slot (per-plane accumulators or pair flags).
    FrameCacheSlot,
    /// Per-tile scratch of the block variants.
    BlockScratch,
    /// Full-plane accumulator of the spatial pixel variant.
    PlaneAccumulator,
}

impl fmt::Display for AllocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocationTarget::KernelTable => "kernel table",
            AllocationTarget::FrameCacheSlot => "frame cache slot",
            AllocationTarget::BlockScratch => "block scratch",
            AllocationTarget::PlaneAccumulator => "plane accumulator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum NlMeansError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("allocation failure: {target}")]
    Allocation { target: AllocationTarget },

    #[error("frame allocation failure for output frame {index}")]
    FrameAllocation { index: usize },

    #[error("unsupported clip format: {reason}")]
    InvalidFormat { reason: String },

    #[error("frame {index} is out of range (clip has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("source frame {index}: {reason}")]
    Source { index: usize, reason: String },
}

impl NlMeansError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        NlMeansError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NlMeansError>;
