//! Filter configuration and validation.

use crate::error::{NlMeansError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Default horizontal search radius
const DEFAULT_AX: usize = 4;

/// Default vertical search radius
const DEFAULT_AY: usize = 4;

/// Default temporal radius (0 = spatial only)
const DEFAULT_AZ: usize = 0;

/// Default horizontal patch radius
const DEFAULT_SX: usize = 2;

/// Default vertical patch radius
const DEFAULT_SY: usize = 2;

/// Default horizontal block radius
const DEFAULT_BX: usize = 1;

/// Default vertical block radius
const DEFAULT_BY: usize = 1;

/// Default Gaussian kernel bandwidth
const DEFAULT_A: f64 = 1.0;

/// Default filtering strength
const DEFAULT_H: f64 = 1.8;

/// Default metric selector (sum of squared differences)
const DEFAULT_SSD: bool = true;

const PROFILE_TIMING_ENV: &str = "NLMEANS_PROFILE_TIMING";

// =============================================================================
// Types
// =============================================================================

/// Patch distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Kernel-weighted sum of absolute differences, weight scale `-1/h`.
    Sad,
    /// Kernel-weighted sum of squared differences, weight scale `-1/h²`.
    Ssd,
}

/// Which of the four accumulation strategies a configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    SpatialPixel,
    SpatialBlock,
    TemporalPixel,
    TemporalBlock,
}

/// NL-means parameters.
///
/// Radii are unsigned, so the "≥ 0" constraints hold by construction;
/// `validate` checks the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NlMeansConfig {
    /// Horizontal search radius. Default: 4
    pub ax: usize,
    /// Vertical search radius. Default: 4
    pub ay: usize,
    /// Temporal search radius, 0 disables the frame window. Default: 0
    pub az: usize,
    /// Horizontal patch radius. Default: 2
    pub sx: usize,
    /// Vertical patch radius. Default: 2
    pub sy: usize,
    /// Horizontal block radius, 0 together with `by = 0` selects pixel mode. Default: 1
    pub bx: usize,
    /// Vertical block radius. Default: 1
    pub by: usize,
    /// Gaussian kernel bandwidth. Default: 1.0
    pub a: f64,
    /// Filtering strength. Default: 1.8
    pub h: f64,
    /// Use SSD instead of SAD. Default: true
    pub ssd: bool,
}

impl Default for NlMeansConfig {
    fn default() -> Self {
        Self {
            ax: DEFAULT_AX,
            ay: DEFAULT_AY,
            az: DEFAULT_AZ,
            sx: DEFAULT_SX,
            sy: DEFAULT_SY,
            bx: DEFAULT_BX,
            by: DEFAULT_BY,
            a: DEFAULT_A,
            h: DEFAULT_H,
            ssd: DEFAULT_SSD,
        }
    }
}

impl NlMeansConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.h.is_finite() && self.h > 0.0) {
            return Err(NlMeansError::invalid("h", "must be greater than 0"));
        }
        if !(self.a.is_finite() && self.a > 0.0) {
            return Err(NlMeansError::invalid("a", "must be greater than 0"));
        }
        if self.sx < self.bx {
            return Err(NlMeansError::invalid(
                "sx",
                format!("must be greater than or equal to bx ({})", self.bx),
            ));
        }
        if self.sy < self.by {
            return Err(NlMeansError::invalid(
                "sy",
                format!("must be greater than or equal to by ({})", self.by),
            ));
        }
        Ok(())
    }

    pub fn is_temporal(&self) -> bool {
        self.az > 0
    }

    pub fn is_block(&self) -> bool {
        self.bx > 0 || self.by > 0
    }

    pub fn metric(&self) -> Metric {
        if self.ssd {
            Metric::Ssd
        } else {
            Metric::Sad
        }
    }

    pub fn variant(&self) -> Variant {
        match (self.is_temporal(), self.is_block()) {
            (false, false) => Variant::SpatialPixel,
            (false, true) => Variant::SpatialBlock,
            (true, false) => Variant::TemporalPixel,
            (true, true) => Variant::TemporalBlock,
        }
    }

    /// Number of frames in the temporal window (`2·az + 1`).
    pub fn window_len(&self) -> usize {
        self.az * 2 + 1
    }
}

/// Whether per-frame timing lines should be logged.
pub(crate) fn resolve_profile_timing() -> bool {
    std::env::var(PROFILE_TIMING_ENV)
        .ok()
        .is_some_and(|value| profile_timing_enabled(&value))
}

fn profile_timing_enabled(value: &str) -> bool {
    let v = value.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}
