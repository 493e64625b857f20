//! Player configuration file
//!
//! A YAML document selecting a build variant, optional profile overrides,
//! the source to play and pipeline tuning:
//!
//! ```yaml
//! variant: low-end
//! overrides:
//!   target_fps: 15
//! source:
//!   name: "STUDIO-PC (Camera 1)"
//!   address: "10.0.0.12:5960"
//! connect_timeout_ms: 2000
//! read_timeout_ms: 1000
//! log_filter: "ndiplay=debug"
//! ```
//!
//! `NDIPLAY_VARIANT` in the environment takes precedence over `variant`.
//!
//! ```rust,no_run
//! # fn main() -> ndiplay::Result<()> {
//! let config = ndiplay::PlayerConfig::from_path("player.yaml")?;
//! config.init_logging()?;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::capability::{CapabilityController, ProfileOverrides};
use crate::logging;
use crate::pipeline::PipelineOptions;
use crate::providers::mock::SyntheticConfig;
use crate::providers::network::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::types::{BuildVariant, CapabilityProfile, SourceDescriptor};
use crate::{PipelineError, Result};

/// Everything a player process needs to start one stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Build variant; `None` means release
    pub variant: Option<BuildVariant>,

    /// Field-level replacements applied to the variant's profile
    pub overrides: ProfileOverrides,

    /// Network source to play; required unless the profile uses the mock source
    pub source: Option<SourceDescriptor>,

    pub pipeline: PipelineOptions,

    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    /// `tracing` filter directive, e.g. `ndiplay=debug`
    pub log_filter: Option<String>,

    /// Synthetic stream played when the profile selects the mock source
    pub mock: Option<SyntheticConfig>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            variant: None,
            overrides: ProfileOverrides::default(),
            source: None,
            pipeline: PipelineOptions::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            log_filter: None,
            mock: None,
        }
    }
}

impl PlayerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cleaned = strip_control_chars(yaml);
        let config: PlayerConfig = serde_yaml_ng::from_str(&cleaned)
            .map_err(|e| PipelineError::config(format!("invalid player config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("reading config {}", path.display()), e))?;
        debug!(path = %path.display(), bytes = yaml.len(), "Loaded player config");
        Self::from_yaml_str(&yaml)
    }

    /// Check everything that does not depend on the environment
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.connect_timeout_ms == 0 {
            return Err(PipelineError::config("connect_timeout_ms must be non-zero"));
        }
        if self.read_timeout_ms == 0 {
            return Err(PipelineError::config("read_timeout_ms must be non-zero"));
        }
        if let Some(mock) = &self.mock {
            if mock.fps == 0 {
                return Err(PipelineError::config("mock.fps must be non-zero"));
            }
            if mock.resolution.width == 0 || mock.resolution.height == 0 {
                return Err(PipelineError::config("mock.resolution must be non-zero"));
            }
            if !mock.codec.is_video() {
                return Err(PipelineError::config(format!("mock.codec {} is not a video layout", mock.codec)));
            }
        }
        if let Some(source) = &self.source {
            if source.address.trim().is_empty() {
                return Err(PipelineError::config("source.address must not be empty"));
            }
        }
        if let Some(filter) = &self.log_filter {
            logging::parse_filter(filter)?;
        }
        Ok(())
    }

    /// Install the global subscriber with this config's `log_filter`.
    ///
    /// `RUST_LOG` still takes precedence; see [`logging::init`].
    pub fn init_logging(&self) -> Result<()> {
        logging::init(self.log_filter.as_deref())
    }

    /// Variant after applying `NDIPLAY_VARIANT`
    pub fn effective_variant(&self) -> Result<BuildVariant> {
        Ok(CapabilityController::variant_from_env()?.or(self.variant).unwrap_or_default())
    }

    /// Resolve the capability profile this configuration selects
    pub fn profile(&self) -> Result<Arc<CapabilityProfile>> {
        self.profile_for(self.effective_variant()?)
    }

    /// Resolve the profile for an explicit variant, ignoring the environment
    pub fn profile_for(&self, variant: BuildVariant) -> Result<Arc<CapabilityProfile>> {
        let base = CapabilityController::resolve(variant);
        let profile = CapabilityController::customize(base, &self.overrides)?;
        info!(%variant, fps = profile.target_fps(), mock = profile.use_mock_source(), "Player profile selected");
        Ok(Arc::new(profile))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Drop control characters other than tab, newline and carriage return
fn strip_control_chars(yaml: &str) -> String {
    yaml.chars().filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::types::{CodecKind, Resolution};
    use anyhow::{Context, Result, ensure};

    const FULL: &str = r#"
variant: low-end
overrides:
  target_fps: 15
  max_cache_depth: 3
source:
  name: "STUDIO-PC (Camera 1)"
  address: "10.0.0.12:5960"
pipeline:
  packet_channel_capacity: 4
  read_retry:
    max_attempts: 2
    base_delay_ms: 10
    max_delay_ms: 40
connect_timeout_ms: 500
log_filter: "ndiplay=debug"
mock:
  resolution: { width: 320, height: 240 }
  codec: Bgra
  fps: 20
  frames: 100
"#;

    #[test]
    fn parses_full_document() -> Result<()> {
        let config = PlayerConfig::from_yaml_str(FULL).context("parsing FULL")?;
        assert_eq!(config.variant, Some(BuildVariant::LowEnd));
        assert_eq!(config.overrides.target_fps, Some(15));
        assert_eq!(config.source.as_ref().map(|s| s.address.as_str()), Some("10.0.0.12:5960"));
        assert_eq!(config.pipeline.packet_channel_capacity, 4);
        assert_eq!(config.pipeline.audio_channel_capacity, 16);
        assert_eq!(
            config.pipeline.read_retry,
            RetryPolicy { max_attempts: 2, base_delay_ms: 10, max_delay_ms: 40 }
        );
        assert_eq!(config.pipeline.connect_retry, RetryPolicy::CONNECT);
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.read_timeout(), DEFAULT_READ_TIMEOUT);
        assert_eq!(config.log_filter.as_deref(), Some("ndiplay=debug"));

        let mock = config.mock.context("FULL has a mock section")?;
        assert_eq!(mock.resolution, Resolution::new(320, 240));
        assert_eq!(mock.codec, CodecKind::Bgra);
        assert_eq!(mock.frames, Some(100));
        ensure!(mock.paced, "paced defaults to true");
        ensure!(!mock.audio, "audio defaults to false");
        Ok(())
    }

    #[test]
    fn profile_applies_overrides() -> Result<()> {
        let config = PlayerConfig::from_yaml_str(FULL)?;
        let profile = config.profile_for(BuildVariant::LowEnd).context("resolving low-end")?;
        assert_eq!(profile.target_fps(), 15);
        assert_eq!(profile.max_cache_depth(), 3);
        assert_eq!(profile.max_resolution(), Some(Resolution::new(854, 480)));
        Ok(())
    }

    #[test]
    fn empty_document_is_release_defaults() -> Result<()> {
        let config = PlayerConfig::from_yaml_str("{}")?;
        assert_eq!(config, PlayerConfig::default());
        let profile = config.profile_for(config.variant.unwrap_or_default())?;
        assert_eq!(profile.variant(), BuildVariant::Release);
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = PlayerConfig::from_yaml_str("variant: release\nframerate: 30\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_variant() {
        assert!(PlayerConfig::from_yaml_str("variant: turbo\n").is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        for yaml in [
            "pipeline:\n  audio_channel_capacity: 0\n",
            "read_timeout_ms: 0\n",
            "pipeline:\n  connect_retry: { max_attempts: 0, base_delay_ms: 1, max_delay_ms: 1 }\n",
            "mock:\n  resolution: { width: 0, height: 2 }\n  codec: Uyvy\n  fps: 30\n",
            "mock:\n  resolution: { width: 2, height: 2 }\n  codec: PcmF32\n  fps: 30\n",
            "source:\n  name: x\n  address: \"  \"\n",
            "log_filter: \"ndiplay=loud\"\n",
        ] {
            let err = PlayerConfig::from_yaml_str(yaml).expect_err(yaml);
            assert!(matches!(err, PipelineError::Config { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn out_of_range_override_fails_at_profile() {
        let config = PlayerConfig::from_yaml_str("overrides:\n  max_cache_depth: 64\n").unwrap();
        assert!(config.profile_for(BuildVariant::Debug).is_err());
    }

    #[test]
    fn control_characters_are_ignored() {
        let config = PlayerConfig::from_yaml_str("variant: \u{1}staging\n").unwrap();
        assert_eq!(config.variant, Some(BuildVariant::Staging));
    }

    #[test]
    fn init_logging_uses_the_configured_filter() -> Result<()> {
        let config = PlayerConfig::from_yaml_str("log_filter: \"ndiplay=trace\"\n")?;
        // Another test may already own the global subscriber.
        match config.init_logging() {
            Ok(()) | Err(PipelineError::Config { .. }) => {}
            Err(other) => anyhow::bail!("unexpected error: {other}"),
        }
        ensure!(config.init_logging().is_err(), "second install must be refused");
        Ok(())
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PlayerConfig::from_path("/nonexistent/ndiplay.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
