//! Presentation keeps its cadence while full-HD frames are converted on the CPU.
//!
//! Runs on a single-threaded runtime in real time: the pacer shares its only
//! worker thread with the receiver and decoder tasks.

use anyhow::{Context, Result, ensure};
use ndiplay::{
    BuildVariant, CapabilityController, CapabilityProfile, CodecKind, DecodedFrame, MockSource, PipelineOptions,
    ProfileOverrides, Renderer, Resolution, SourceDescriptor, StreamPipeline, StreamState, SyntheticConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingRenderer {
    presented: u64,
}

impl Renderer for CountingRenderer {
    fn present(&mut self, _frame: DecodedFrame) {
        self.presented += 1;
    }
}

fn software_profile() -> Result<Arc<CapabilityProfile>> {
    let overrides = ProfileOverrides { hardware_acceleration: Some(false), ..Default::default() };
    let base = CapabilityController::resolve(BuildVariant::Release);
    let profile = CapabilityController::customize(base, &overrides).context("valid software override")?;
    Ok(Arc::new(profile))
}

#[tokio::test(flavor = "current_thread")]
async fn software_decode_at_1080p_misses_no_ticks() -> Result<()> {
    let source = MockSource::synthetic(SyntheticConfig {
        resolution: Resolution::new(1920, 1080),
        codec: CodecKind::Uyvy,
        fps: 30,
        frames: Some(30),
        audio: false,
        paced: true,
    });
    let descriptor = SourceDescriptor::new("full-hd", "mock://1080p");
    let pipeline = StreamPipeline::start(
        source,
        &descriptor,
        software_profile()?,
        CountingRenderer::default(),
        PipelineOptions::default(),
    )
    .await
    .context("mock source should connect")?;

    // Unoptimized builds convert far slower than real time; only the pacer has to keep up.
    let state = tokio::time::timeout(Duration::from_secs(60), pipeline.finished())
        .await
        .context("stream should end")?;
    ensure!(state == StreamState::Ended, "unexpected final state {state:?}");

    let stats = pipeline.stats();
    let renderer = pipeline.join().await.context("pipeline tasks should not panic")?;

    ensure!(stats.frames_decoded == 30, "decoded {} of 30 frames", stats.frames_decoded);
    ensure!(stats.missed_ticks == 0, "pacer fell behind: {stats}");
    ensure!(renderer.presented == stats.frames_presented, "renderer and counters disagree: {stats}");
    ensure!(stats.decode_samples == 30, "every decode is timed: {stats}");
    Ok(())
}
