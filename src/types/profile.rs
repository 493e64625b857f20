//! Device tier capability profiles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::Resolution;
use crate::PipelineError;

/// Build variant a process was started as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "kebab-case")]
pub enum BuildVariant {
    Debug,
    #[default]
    Release,
    /// Constrained devices: lower frame rate, smaller cache, 480p cap
    #[serde(alias = "lowend")]
    LowEnd,
    /// Pre-release testing against mock sources
    Staging,
}

impl BuildVariant {
    /// Every variant, in declaration order
    pub const ALL: [BuildVariant; 4] =
        [BuildVariant::Debug, BuildVariant::Release, BuildVariant::LowEnd, BuildVariant::Staging];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
            BuildVariant::LowEnd => "low-end",
            BuildVariant::Staging => "staging",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildVariant {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildVariant::Debug),
            "release" => Ok(BuildVariant::Release),
            "low-end" | "lowend" | "low_end" => Ok(BuildVariant::LowEnd),
            "staging" => Ok(BuildVariant::Staging),
            other => Err(PipelineError::config(format!(
                "unknown build variant '{}' (expected debug, release, low-end or staging)",
                other
            ))),
        }
    }
}

/// Resolved performance and quality knobs for one device tier
///
/// Immutable once constructed; share it as `Arc<CapabilityProfile>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct CapabilityProfile {
    pub(crate) variant: BuildVariant,
    pub(crate) target_fps: u32,
    pub(crate) max_cache_depth: usize,
    pub(crate) max_resolution: Option<Resolution>,
    pub(crate) hardware_acceleration: bool,
    pub(crate) use_mock_source: bool,
}

impl CapabilityProfile {
    pub fn variant(&self) -> BuildVariant {
        self.variant
    }

    /// Presentation rate in frames per second
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Maximum number of decoded frames held between decode and presentation
    pub fn max_cache_depth(&self) -> usize {
        self.max_cache_depth
    }

    /// Largest frame the device accepts, if capped
    pub fn max_resolution(&self) -> Option<Resolution> {
        self.max_resolution
    }

    pub fn hardware_acceleration(&self) -> bool {
        self.hardware_acceleration
    }

    /// Whether the mock source replaces the network receiver
    pub fn use_mock_source(&self) -> bool {
        self.use_mock_source
    }

    /// Duration of one presentation tick
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps as f64)
    }

    /// Check a frame resolution against the cap
    pub fn admits(&self, resolution: Resolution) -> bool {
        match self.max_resolution {
            Some(max) => resolution.fits_within(max),
            None => true,
        }
    }
}
