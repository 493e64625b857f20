//! Error types for the playback pipeline.
//!
//! Every failure the pipeline can observe is one variant of [`PipelineError`].
//! Variants carry structured context and classify themselves so callers can
//! decide between retrying, skipping, and tearing a stream down.
//!
//! ## Error Categories
//!
//! - **Connect time**: [`PipelineError::SourceUnavailable`]
//! - **Read time**: [`PipelineError::TransientIo`], [`PipelineError::StreamEnded`],
//!   [`PipelineError::Protocol`]
//! - **Decode time**: [`PipelineError::Decode`], [`PipelineError::StreamFailed`]
//! - **Presentation**: [`PipelineError::CacheFull`], [`PipelineError::CapabilityExceeded`],
//!   [`PipelineError::StaleFrame`], [`PipelineError::TimingDrift`]
//! - **Setup**: [`PipelineError::Config`], [`PipelineError::Io`]
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use ndiplay::PipelineError;
//!
//! let error = PipelineError::source_unavailable("Studio A", 1, "connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("Source '{source_name}' unavailable after {attempts} attempt(s): {reason}")]
    SourceUnavailable {
        source_name: String,
        attempts: u32,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transient I/O error while {context} (attempt {attempts})")]
    TransientIo {
        context: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream {stream_id} ended")]
    StreamEnded { stream_id: u64 },

    #[error("Decode failed for packet {sequence}: {details}")]
    Decode { sequence: u64, details: String },

    #[error("Stream {stream_id} failed after {consecutive_errors} consecutive decode errors: {reason}")]
    StreamFailed { stream_id: u64, consecutive_errors: u32, reason: String },

    #[error("Cache full: capacity {capacity}")]
    CacheFull { capacity: usize },

    #[error("Frame {width}x{height} exceeds capability limit {max_width}x{max_height}")]
    CapabilityExceeded { width: u32, height: u32, max_width: u32, max_height: u32 },

    #[error("Frame pts {pts:?} is older than cached pts {newest:?}")]
    StaleFrame { pts: Duration, newest: Duration },

    #[error("Presentation drifted by {lag:?}, skipped {missed_ticks} tick(s)")]
    TimingDrift { missed_ticks: u64, lag: Duration },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::SourceUnavailable { .. } => true,
            PipelineError::TransientIo { .. } => true,
            PipelineError::StreamEnded { .. } => false,
            PipelineError::Decode { .. } => false,
            PipelineError::StreamFailed { .. } => false,
            PipelineError::CacheFull { .. } => false,
            PipelineError::CapabilityExceeded { .. } => false,
            PipelineError::StaleFrame { .. } => false,
            PipelineError::TimingDrift { .. } => false,
            PipelineError::Protocol { .. } => false,
            PipelineError::Config { .. } => false,
            PipelineError::Io { .. } => false,
        }
    }

    /// Returns whether this error ends the stream it occurred on.
    ///
    /// `StreamEnded` is terminal but clean; the other terminal variants tear
    /// the stream down as a failure.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::StreamEnded { .. }
                | PipelineError::StreamFailed { .. }
                | PipelineError::Protocol { .. }
        )
    }

    /// Returns whether this error is the clean end-of-stream signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, PipelineError::StreamEnded { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PipelineError::SourceUnavailable { .. } => vec![
                "Check the source is running and reachable",
                "Verify the source address and port",
                "Increase the connect retry budget",
            ],
            PipelineError::TransientIo { .. } => vec![
                "Check network stability",
                "Increase the read timeout",
                "Increase the read retry budget",
            ],
            PipelineError::StreamEnded { .. } => vec!["Reconnect when the source restarts"],
            PipelineError::Decode { .. } => vec![
                "Verify the source pixel format is supported",
                "Check for payload corruption on the network path",
            ],
            PipelineError::StreamFailed { .. } => vec![
                "Reconnect to the source",
                "Switch the decoder backend via the hardware acceleration flag",
            ],
            PipelineError::CacheFull { .. } => vec![
                "Drain frames faster",
                "Increase the cache depth for this device tier",
            ],
            PipelineError::CapabilityExceeded { .. } => vec![
                "Request a lower resolution from the source",
                "Use a device profile with a higher resolution limit",
            ],
            PipelineError::StaleFrame { .. } => vec![
                "Check the source emits monotonic timestamps",
                "Reduce network reordering between source and player",
            ],
            PipelineError::TimingDrift { .. } => vec![
                "Reduce the target frame rate",
                "Check for scheduler contention",
            ],
            PipelineError::Protocol { .. } => vec![
                "Verify the source speaks a compatible protocol version",
                "Check the source address points at a stream endpoint",
            ],
            PipelineError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Verify override values are within range",
            ],
            PipelineError::Io { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for connect-time failures.
    pub fn source_unavailable(
        source_name: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::SourceUnavailable {
            source_name: source_name.into(),
            attempts,
            reason: reason.into(),
            source: None,
        }
    }

    /// Helper constructor for connect-time failures with source.
    pub fn source_unavailable_with_source(
        source_name: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PipelineError::SourceUnavailable {
            source_name: source_name.into(),
            attempts,
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for transient read failures.
    pub fn transient_io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::TransientIo { context: context.into(), attempts: 1, source }
    }

    /// Helper constructor for per-packet decode failures.
    pub fn decode(sequence: u64, details: impl Into<String>) -> Self {
        PipelineError::Decode { sequence, details: details.into() }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        PipelineError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        PipelineError::Config { reason: reason.into() }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io { context: context.into(), source }
    }

    /// Returns a copy of this error with the attempt count replaced.
    ///
    /// Only connect and transient read errors carry an attempt count; other
    /// variants are returned unchanged.
    pub fn with_attempts(self, attempts: u32) -> Self {
        match self {
            PipelineError::SourceUnavailable { source_name, reason, source, .. } => {
                PipelineError::SourceUnavailable { source_name, attempts, reason, source }
            }
            PipelineError::TransientIo { context, source, .. } => {
                PipelineError::TransientIo { context, attempts, source }
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io { context: "<unknown>".to_string(), source: err }
    }
}
