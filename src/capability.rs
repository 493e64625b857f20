//! Capability controller: maps a build variant to its device profile.
//!
//! Resolution is a pure function of the variant. A process resolves its
//! profile once at startup and passes it by `Arc` to every component's
//! constructor; nothing looks it up ambiently afterwards.
//!
//! | variant  | fps | cache | hw accel | max res | mock |
//! |----------|-----|-------|----------|---------|------|
//! | debug    | 30  | 3     | on       | -       | off  |
//! | release  | 30  | 3     | on       | -       | off  |
//! | low-end  | 20  | 2     | on       | 854x480 | off  |
//! | staging  | 25  | 4     | on       | -       | on   |

use tracing::{debug, info};

use crate::types::{BuildVariant, CapabilityProfile, Resolution};
use crate::{PipelineError, Result};

/// Environment variable consulted by [`CapabilityController::variant_from_env`]
pub const VARIANT_ENV: &str = "NDIPLAY_VARIANT";

/// Resolution cap for the low-end tier
pub const LOW_END_MAX_RESOLUTION: Resolution = Resolution::new(854, 480);

/// Accepted range for target frame rates
pub const FPS_RANGE: std::ops::RangeInclusive<u32> = 1..=120;

/// Accepted range for cache depths
pub const CACHE_DEPTH_RANGE: std::ops::RangeInclusive<usize> = 1..=16;

/// Selects the capability profile for a process
pub struct CapabilityController;

impl CapabilityController {
    /// Map a build variant to its profile
    pub fn resolve(variant: BuildVariant) -> CapabilityProfile {
        match variant {
            BuildVariant::Debug => CapabilityProfile {
                variant,
                target_fps: 30,
                max_cache_depth: 3,
                max_resolution: None,
                hardware_acceleration: true,
                use_mock_source: false,
            },
            BuildVariant::Release => CapabilityProfile {
                variant,
                target_fps: 30,
                max_cache_depth: 3,
                max_resolution: None,
                hardware_acceleration: true,
                use_mock_source: false,
            },
            BuildVariant::LowEnd => CapabilityProfile {
                variant,
                target_fps: 20,
                max_cache_depth: 2,
                max_resolution: Some(LOW_END_MAX_RESOLUTION),
                hardware_acceleration: true,
                use_mock_source: false,
            },
            BuildVariant::Staging => CapabilityProfile {
                variant,
                target_fps: 25,
                max_cache_depth: 4,
                max_resolution: None,
                hardware_acceleration: true,
                use_mock_source: true,
            },
        }
    }

    /// Read the variant from `NDIPLAY_VARIANT`, if set
    pub fn variant_from_env() -> Result<Option<BuildVariant>> {
        match std::env::var(VARIANT_ENV) {
            Ok(value) => {
                let variant = value.parse()?;
                debug!(%variant, "Build variant taken from {}", VARIANT_ENV);
                Ok(Some(variant))
            }
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => {
                Err(PipelineError::config(format!("{} is not valid unicode", VARIANT_ENV)))
            }
        }
    }

    /// Apply validated overrides on top of a resolved profile
    pub fn customize(base: CapabilityProfile, overrides: &ProfileOverrides) -> Result<CapabilityProfile> {
        let mut profile = base;

        if let Some(fps) = overrides.target_fps {
            if !FPS_RANGE.contains(&fps) {
                return Err(PipelineError::config(format!(
                    "target_fps {} outside {}..={}",
                    fps,
                    FPS_RANGE.start(),
                    FPS_RANGE.end()
                )));
            }
            profile.target_fps = fps;
        }

        if let Some(depth) = overrides.max_cache_depth {
            if !CACHE_DEPTH_RANGE.contains(&depth) {
                return Err(PipelineError::config(format!(
                    "max_cache_depth {} outside {}..={}",
                    depth,
                    CACHE_DEPTH_RANGE.start(),
                    CACHE_DEPTH_RANGE.end()
                )));
            }
            profile.max_cache_depth = depth;
        }

        if let Some(max) = overrides.max_resolution {
            if max.width == 0 || max.height == 0 {
                return Err(PipelineError::config(format!("max_resolution {} must be non-zero", max)));
            }
            profile.max_resolution = Some(max);
        }

        if let Some(hw) = overrides.hardware_acceleration {
            profile.hardware_acceleration = hw;
        }

        if let Some(mock) = overrides.use_mock_source {
            profile.use_mock_source = mock;
        }

        info!(
            variant = %profile.variant,
            target_fps = profile.target_fps,
            max_cache_depth = profile.max_cache_depth,
            hardware_acceleration = profile.hardware_acceleration,
            use_mock_source = profile.use_mock_source,
            "Capability profile resolved"
        );

        Ok(profile)
    }
}

/// Optional per-field replacements for a resolved profile
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    pub target_fps: Option<u32>,
    pub max_cache_depth: Option<usize>,
    pub max_resolution: Option<Resolution>,
    pub hardware_acceleration: Option<bool>,
    pub use_mock_source: Option<bool>,
}
