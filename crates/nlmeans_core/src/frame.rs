//! Planar 8-bit frames and the collaborators that produce and receive them.
//!
//! The denoiser does not decode or schedule anything itself. It pulls source
//! frames through a [`FrameSource`] and asks a [`FrameSink`] for each output
//! buffer, so a host can plug in its own frame pool. [`MemoryClip`] and
//! [`HeapFrameSink`] are the plain in-memory versions.

use std::sync::Arc;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::error::{NlMeansError, Result};

/// Maximum number of planes in a planar frame.
pub const MAX_PLANES: usize = 3;

/// Geometry of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    /// Width of plane 0.
    pub width: usize,
    /// Height of plane 0.
    pub height: usize,
    pub num_planes: usize,
    /// log2 horizontal chroma subsampling, applied to planes 1 and 2.
    pub subsampling_w: u32,
    /// log2 vertical chroma subsampling, applied to planes 1 and 2.
    pub subsampling_h: u32,
    pub num_frames: usize,
}

impl VideoInfo {
    /// Single-plane (gray) clip.
    pub fn gray(width: usize, height: usize, num_frames: usize) -> Self {
        Self {
            width,
            height,
            num_planes: 1,
            subsampling_w: 0,
            subsampling_h: 0,
            num_frames,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_planes == 0 || self.num_planes > MAX_PLANES {
            return Err(NlMeansError::InvalidFormat {
                reason: format!("plane count {} not in 1..={}", self.num_planes, MAX_PLANES),
            });
        }
        if self.num_frames == 0 {
            return Err(NlMeansError::InvalidFormat {
                reason: "clip has no frames".to_string(),
            });
        }
        for plane in 0..self.num_planes {
            let (rows, cols) = self.plane_dim(plane);
            if rows == 0 || cols == 0 {
                return Err(NlMeansError::InvalidFormat {
                    reason: format!("plane {} is empty ({}x{})", plane, cols, rows),
                });
            }
        }
        Ok(())
    }

    /// (rows, cols) of `plane`.
    pub fn plane_dim(&self, plane: usize) -> (usize, usize) {
        if plane == 0 {
            (self.height, self.width)
        } else {
            (
                self.height >> self.subsampling_h,
                self.width >> self.subsampling_w,
            )
        }
    }

    /// Map a window index onto the clip, repeating the first/last frame
    /// past either end.
    pub fn clamp_index(&self, index: i64) -> usize {
        if index < 0 {
            0
        } else {
            (index as usize).min(self.num_frames.saturating_sub(1))
        }
    }
}

/// Owned planar 8-bit frame, one `rows × cols` array per plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    planes: Vec<Array2<u8>>,
}

impl Frame {
    pub fn from_planes(planes: Vec<Array2<u8>>) -> Self {
        Self { planes }
    }

    /// Zero-filled frame with the geometry of `info`.
    pub fn blank(info: &VideoInfo) -> Self {
        let planes = (0..info.num_planes)
            .map(|p| Array2::zeros(info.plane_dim(p)))
            .collect();
        Self { planes }
    }

    /// Zero-filled frame with the same plane layout as `self`.
    pub fn blank_like(&self) -> Self {
        let planes = self.planes.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        Self { planes }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, plane: usize) -> ArrayView2<'_, u8> {
        self.planes[plane].view()
    }

    pub fn plane_mut(&mut self, plane: usize) -> ArrayViewMut2<'_, u8> {
        self.planes[plane].view_mut()
    }

    pub fn width(&self, plane: usize) -> usize {
        self.planes[plane].ncols()
    }

    pub fn height(&self, plane: usize) -> usize {
        self.planes[plane].nrows()
    }

    /// Distance in bytes between vertically adjacent pixels.
    pub fn stride(&self, plane: usize) -> usize {
        self.planes[plane].strides()[0].unsigned_abs()
    }

    /// Raw pointer to the first pixel of `plane`.
    pub fn as_ptr(&self, plane: usize) -> *const u8 {
        self.planes[plane].as_ptr()
    }

    pub fn matches(&self, info: &VideoInfo) -> bool {
        self.planes.len() == info.num_planes
            && self
                .planes
                .iter()
                .enumerate()
                .all(|(p, data)| data.dim() == info.plane_dim(p))
    }
}

/// Supplier of decoded source frames.
///
/// `fetch` may block. Implementations must hand out frames matching `info()`.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &VideoInfo;

    fn fetch(&self, index: usize) -> Result<Arc<Frame>>;
}

/// Allocator for output frames. `None` reports an allocation failure.
pub trait FrameSink: Send + Sync {
    fn allocate(&self, template: &Frame) -> Option<Frame>;
}

/// Clip held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryClip {
    info: VideoInfo,
    frames: Vec<Arc<Frame>>,
}

impl MemoryClip {
    pub fn new(info: VideoInfo, frames: Vec<Frame>) -> Result<Self> {
        info.validate()?;
        if frames.len() != info.num_frames {
            return Err(NlMeansError::InvalidFormat {
                reason: format!(
                    "expected {} frames, got {}",
                    info.num_frames,
                    frames.len()
                ),
            });
        }
        if let Some(index) = frames.iter().position(|f| !f.matches(&info)) {
            return Err(NlMeansError::Source {
                index,
                reason: "geometry does not match the clip".to_string(),
            });
        }
        Ok(Self {
            info,
            frames: frames.into_iter().map(Arc::new).collect(),
        })
    }

    /// Single-plane clip from same-sized luma arrays.
    pub fn gray(frames: Vec<Array2<u8>>) -> Result<Self> {
        let (rows, cols) = frames.first().map(|f| f.dim()).unwrap_or((0, 0));
        let info = VideoInfo::gray(cols, rows, frames.len());
        let frames = frames
            .into_iter()
            .map(|plane| Frame::from_planes(vec![plane]))
            .collect();
        Self::new(info, frames)
    }
}

impl FrameSource for MemoryClip {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn fetch(&self, index: usize) -> Result<Arc<Frame>> {
        self.frames
            .get(index)
            .cloned()
            .ok_or(NlMeansError::FrameOutOfRange {
                index,
                count: self.frames.len(),
            })
    }
}

/// Sink that allocates each output frame on the heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapFrameSink;

impl FrameSink for HeapFrameSink {
    fn allocate(&self, template: &Frame) -> Option<Frame> {
        Some(template.blank_like())
    }
}
