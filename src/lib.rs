//! Bounded-latency playback pipeline for NDI-style network video streams.
//!
//! ndiplay receives encoded packets from a network source, decodes them,
//! keeps a small bounded cache of ready frames and hands the freshest one to
//! a renderer at a fixed cadence. Constrained devices degrade gracefully
//! through their capability profile instead of building up latency.
//!
//! # Features
//!
//! - **Bounded latency**: at most `max_cache_depth` frames between decode and
//!   presentation, oldest dropped first
//! - **Device tiers**: debug, release, low-end and staging profiles
//! - **Fault isolation**: decode errors skip a packet, three in a row fail
//!   only that stream
//! - **Mock sources**: scripted and synthetic streams share the network
//!   receiver's contract
//! - **Recycled buffers**: software-decoded frames return their pixels to a
//!   per-stream [`PixelPool`] when dropped
//!
//! ```text
//! PacketSource -> receiver -> DecoderAdapter -> FrameCache -> Pacer -> Renderer
//!                                  \-> audio channel
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ndiplay::{BuildVariant, CapabilityController, DecodedFrame, Ndiplay, Renderer, SourceDescriptor};
//! use std::sync::Arc;
//!
//! struct Window;
//!
//! impl Renderer for Window {
//!     fn present(&mut self, frame: DecodedFrame) {
//!         println!("frame {} at {:?}", frame.sequence, frame.pts);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ndiplay::Result<()> {
//!     let profile = Arc::new(CapabilityController::resolve(BuildVariant::Release));
//!     let source = SourceDescriptor::new("STUDIO-PC (Camera 1)", "10.0.0.12:5960");
//!
//!     let pipeline = Ndiplay::connect(&source, profile, Window).await?;
//!     let state = pipeline.finished().await;
//!     println!("stream {:?}: {}", state, pipeline.stats());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod capability;
pub mod config;
pub mod decoder;
pub mod driver;
mod error;
pub mod logging;
pub mod metrics;
pub mod pacer;
pub mod pipeline;
pub mod pool;
pub mod providers;
pub mod retry;
pub mod source;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
pub mod wire;

// Core exports
pub use error::*;
pub use types::*;

pub use cache::{CacheRejection, FrameCache, PushOutcome};
pub use capability::{CapabilityController, ProfileOverrides};
pub use config::PlayerConfig;
pub use decoder::{DecodeBackend, DecoderAdapter};
pub use driver::StreamState;
pub use metrics::{StatsSnapshot, StreamStats};
pub use pacer::{Pacer, Renderer};
pub use pipeline::{PipelineOptions, StreamPipeline};
pub use pool::{PixelBuffer, PixelPool};
pub use providers::{MockScript, MockSource, NetworkReceiver, SyntheticConfig};
pub use retry::RetryPolicy;
pub use source::PacketSource;

use std::sync::Arc;
use tracing::info;

/// Mock source address reported in logs and stream handles
const MOCK_ADDRESS: &str = "mock://synthetic";

/// Unified entry point for starting stream pipelines.
///
/// Every constructor connects (with retry) before returning, so a source
/// that stays unreachable surfaces as `SourceUnavailable` right here.
pub struct Ndiplay;

impl Ndiplay {
    /// Play a network source through the default receiver.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use ndiplay::{BuildVariant, CapabilityController, DecodedFrame, Ndiplay, Renderer, SourceDescriptor};
    /// use std::sync::Arc;
    ///
    /// # struct Sink;
    /// # impl Renderer for Sink { fn present(&mut self, _: DecodedFrame) {} }
    /// # #[tokio::main]
    /// # async fn main() -> ndiplay::Result<()> {
    /// let profile = Arc::new(CapabilityController::resolve(BuildVariant::LowEnd));
    /// let source = SourceDescriptor::new("cam", "127.0.0.1:5960");
    /// let pipeline = Ndiplay::connect(&source, profile, Sink).await?;
    /// pipeline.shutdown();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect<R: Renderer>(
        descriptor: &SourceDescriptor,
        profile: Arc<CapabilityProfile>,
        renderer: R,
    ) -> Result<StreamPipeline<R>> {
        StreamPipeline::start(NetworkReceiver::new(), descriptor, profile, renderer, PipelineOptions::default())
            .await
    }

    /// Play a mock source.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ndiplay::{
    ///     BuildVariant, CapabilityController, CodecKind, DecodedFrame, MockSource, Ndiplay, Renderer,
    ///     Resolution, StreamState, SyntheticConfig,
    /// };
    /// use std::sync::Arc;
    ///
    /// # struct Sink;
    /// # impl Renderer for Sink { fn present(&mut self, _: DecodedFrame) {} }
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> ndiplay::Result<()> {
    /// let profile = Arc::new(CapabilityController::resolve(BuildVariant::Staging));
    /// let source = MockSource::synthetic(SyntheticConfig {
    ///     resolution: Resolution::new(64, 36),
    ///     codec: CodecKind::Uyvy,
    ///     fps: 25,
    ///     frames: Some(5),
    ///     audio: false,
    ///     paced: false,
    /// });
    /// let pipeline = Ndiplay::mock(source, profile, Sink).await?;
    /// assert_eq!(pipeline.finished().await, StreamState::Ended);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn mock<R: Renderer>(
        source: MockSource,
        profile: Arc<CapabilityProfile>,
        renderer: R,
    ) -> Result<StreamPipeline<R>> {
        let descriptor = SourceDescriptor::new("mock", MOCK_ADDRESS);
        StreamPipeline::start(source, &descriptor, profile, renderer, PipelineOptions::default()).await
    }

    /// Play whatever a player configuration selects.
    ///
    /// Profiles with `use_mock_source` play the synthetic stream from
    /// `config.mock` (or its defaults); all others connect to
    /// `config.source` over the network.
    pub async fn from_config<R: Renderer>(config: &PlayerConfig, renderer: R) -> Result<StreamPipeline<R>> {
        config.validate()?;
        let profile = config.profile()?;

        if profile.use_mock_source() {
            let synthetic = config.mock.unwrap_or_default();
            info!(
                variant = %profile.variant(),
                resolution = %synthetic.resolution,
                "Using synthetic mock source"
            );
            let descriptor = SourceDescriptor::new("mock", MOCK_ADDRESS);
            let source = MockSource::synthetic(synthetic);
            return StreamPipeline::start(source, &descriptor, profile, renderer, config.pipeline).await;
        }

        let Some(descriptor) = config.source.as_ref() else {
            return Err(PipelineError::config(
                "no source configured and the profile does not use the mock source",
            ));
        };
        let receiver = NetworkReceiver::with_timeouts(config.connect_timeout(), config.read_timeout());
        StreamPipeline::start(receiver, descriptor, profile, renderer, config.pipeline).await
    }
}
