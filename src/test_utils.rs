//! Test utilities shared by unit tests and benches
//!
//! Builders for frames, packets and profiles, plus a renderer that records
//! what it was asked to show.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;
use std::time::Duration;

use crate::capability::{CapabilityController, ProfileOverrides};
use crate::pacer::Renderer;
use crate::providers::mock::test_pattern;
use crate::types::{
    BuildVariant, CapabilityProfile, CodecKind, DecodedFrame, EncodedPacket, FramePayload, PacketFormat,
    Resolution, StreamId,
};

/// Decoded ARGB frame with `sequence`, a pts in milliseconds and a size
pub fn video_frame(sequence: u64, pts_ms: u64, width: u32, height: u32) -> DecodedFrame {
    let resolution = Resolution::new(width, height);
    DecodedFrame {
        stream_id: StreamId(0),
        sequence,
        pts: Duration::from_millis(pts_ms),
        resolution,
        payload: FramePayload::Argb(vec![0xFF00_0000; resolution.pixels()].into()),
    }
}

/// Encoded colour-bar packet in `codec`
pub fn pattern_packet(
    stream_id: StreamId,
    sequence: u64,
    resolution: Resolution,
    codec: CodecKind,
) -> EncodedPacket {
    EncodedPacket::new(
        stream_id,
        sequence,
        Duration::from_millis(sequence * 33),
        PacketFormat::Video { resolution, codec },
        test_pattern(resolution, codec, sequence),
    )
}

/// Profile for `variant` with overrides applied
pub fn profile_with(variant: BuildVariant, overrides: ProfileOverrides) -> Arc<CapabilityProfile> {
    let base = CapabilityController::resolve(variant);
    match CapabilityController::customize(base, &overrides) {
        Ok(profile) => Arc::new(profile),
        Err(e) => panic!("invalid test overrides: {e}"),
    }
}

/// Release profile with software decode
pub fn software_profile() -> Arc<CapabilityProfile> {
    let overrides = ProfileOverrides { hardware_acceleration: Some(false), ..Default::default() };
    profile_with(BuildVariant::Release, overrides)
}

/// Renderer that keeps the sequence and pts of every presented frame
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub presented: Vec<u64>,
    pub pts: Vec<Duration>,
    pub resolutions: Vec<Resolution>,
    pub repeats: usize,
}

impl Renderer for RecordingRenderer {
    fn present(&mut self, frame: DecodedFrame) {
        self.presented.push(frame.sequence);
        self.pts.push(frame.pts);
        self.resolutions.push(frame.resolution);
    }

    fn repeat_last(&mut self) {
        self.repeats += 1;
    }
}
