//! Decoder adapter: encoded packets in, decoded frames out.
//!
//! One [`DecoderAdapter`] exists per stream and exclusively owns its backend.
//! The backend is picked once, at construction, from the capability profile:
//!
//! - [`HardwareDecoder`] when hardware acceleration is on: native layout pass-through
//! - [`SoftwareDecoder`] otherwise: CPU conversion to packed ARGB
//!
//! A failed packet is dropped and counted. After
//! [`MAX_CONSECUTIVE_DECODE_ERRORS`] failures in a row the adapter latches
//! into a failed state and never calls its backend again.

pub mod convert;
mod hardware;
mod software;

pub use hardware::HardwareDecoder;
pub use software::SoftwareDecoder;

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::metrics::StreamStats;
use crate::pool::PixelPool;
use crate::types::{
    CapabilityProfile, CodecKind, DecodedFrame, EncodedPacket, FramePayload, PacketFormat, Resolution,
    StreamHandle, StreamId,
};
use crate::{PipelineError, Result};

/// Consecutive decode failures that escalate to a stream failure
pub const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 3;

/// A video decode implementation
///
/// Backends are configured before their first packet and again whenever
/// the stream's resolution or codec changes.
pub trait DecodeBackend: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// (Re)initialize for a video layout
    fn configure(&mut self, resolution: Resolution, codec: CodecKind) -> Result<()>;

    /// Decode one video packet in the configured layout
    fn decode_video(&mut self, packet: &EncodedPacket) -> Result<FramePayload>;
}

/// Per-stream decoder with failure escalation
pub struct DecoderAdapter {
    stream_id: StreamId,
    backend: Box<dyn DecodeBackend>,
    format: Option<(Resolution, CodecKind)>,
    consecutive_errors: u32,
    failure: Option<String>,
    stats: Arc<StreamStats>,
}

impl DecoderAdapter {
    /// Build an adapter for `handle`, choosing the backend from `profile`
    pub fn new(handle: &StreamHandle, profile: &CapabilityProfile, stats: Arc<StreamStats>) -> Self {
        let backend: Box<dyn DecodeBackend> = if profile.hardware_acceleration() {
            Box::new(HardwareDecoder::new())
        } else {
            // Every cached frame, the one being presented and the one being decoded
            Box::new(SoftwareDecoder::with_pool(PixelPool::new(profile.max_cache_depth() + 2)))
        };
        Self::with_backend(handle, backend, stats)
    }

    /// Build an adapter around an explicit backend
    pub fn with_backend(
        handle: &StreamHandle,
        backend: Box<dyn DecodeBackend>,
        stats: Arc<StreamStats>,
    ) -> Self {
        info!(stream = %handle.id(), backend = backend.name(), "Decoder adapter created");
        Self { stream_id: handle.id(), backend, format: None, consecutive_errors: 0, failure: None, stats }
    }

    /// Name of the selected backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// True once the adapter has escalated to a stream failure
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Decode one packet.
    ///
    /// Returns:
    /// - `Ok(frame)` - decoded; resets the consecutive error count
    /// - `Err(Decode)` - this packet was dropped; keep feeding packets
    /// - `Err(StreamFailed)` - threshold reached, or already failed; stop
    pub fn decode(&mut self, packet: EncodedPacket) -> Result<DecodedFrame> {
        if let Some(reason) = &self.failure {
            return Err(PipelineError::StreamFailed {
                stream_id: self.stream_id.0,
                consecutive_errors: self.consecutive_errors,
                reason: reason.clone(),
            });
        }

        let started = Instant::now();
        match self.decode_packet(&packet) {
            Ok(frame) => {
                self.consecutive_errors = 0;
                self.stats.frames_decoded.inc();
                self.stats.decode_time.record(started.elapsed());
                Ok(frame)
            }
            Err(e) => {
                self.stats.decode_errors.inc();
                self.consecutive_errors += 1;

                if self.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                    let reason = e.to_string();
                    error!(
                        stream = %self.stream_id,
                        sequence = packet.sequence,
                        consecutive_errors = self.consecutive_errors,
                        "Decoder failed, tearing stream down: {}",
                        reason
                    );
                    self.failure = Some(reason.clone());
                    return Err(PipelineError::StreamFailed {
                        stream_id: self.stream_id.0,
                        consecutive_errors: self.consecutive_errors,
                        reason,
                    });
                }

                warn!(
                    stream = %self.stream_id,
                    sequence = packet.sequence,
                    consecutive_errors = self.consecutive_errors,
                    "Dropped undecodable packet: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn decode_packet(&mut self, packet: &EncodedPacket) -> Result<DecodedFrame> {
        if packet.stream_id != self.stream_id {
            return Err(PipelineError::decode(
                packet.sequence,
                format!("packet belongs to stream {}, adapter serves {}", packet.stream_id, self.stream_id),
            ));
        }

        match packet.format {
            PacketFormat::Video { resolution, codec } => {
                self.ensure_configured(packet.sequence, resolution, codec)?;
                let payload = self.backend.decode_video(packet)?;
                Ok(DecodedFrame {
                    stream_id: packet.stream_id,
                    sequence: packet.sequence,
                    pts: packet.capture_time,
                    resolution,
                    payload,
                })
            }
            PacketFormat::Audio { channels, sample_rate } => {
                let samples = convert::pcm_f32_le(&packet.payload, channels).ok_or_else(|| {
                    PipelineError::decode(
                        packet.sequence,
                        format!(
                            "{} audio bytes is not a whole number of {}-channel frames",
                            packet.payload.len(),
                            channels
                        ),
                    )
                })?;
                Ok(DecodedFrame {
                    stream_id: packet.stream_id,
                    sequence: packet.sequence,
                    pts: packet.capture_time,
                    resolution: Resolution::new(0, 0),
                    payload: FramePayload::Audio { samples, channels, sample_rate },
                })
            }
        }
    }

    fn ensure_configured(&mut self, sequence: u64, resolution: Resolution, codec: CodecKind) -> Result<()> {
        let wanted = (resolution, codec);
        if self.format == Some(wanted) {
            return Ok(());
        }

        self.backend
            .configure(resolution, codec)
            .map_err(|e| PipelineError::decode(sequence, format!("backend configure failed: {}", e)))?;

        if let Some((old_resolution, old_codec)) = self.format.replace(wanted) {
            self.stats.decoder_reinits.inc();
            info!(
                stream = %self.stream_id,
                from = %format_args!("{} {}", old_codec, old_resolution),
                to = %format_args!("{} {}", codec, resolution),
                "Stream format changed, decoder reinitialized"
            );
        } else {
            debug!(stream = %self.stream_id, %resolution, %codec, "Decoder configured");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DecoderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderAdapter")
            .field("stream_id", &self.stream_id)
            .field("backend", &self.backend.name())
            .field("format", &self.format)
            .field("consecutive_errors", &self.consecutive_errors)
            .field("failed", &self.failure.is_some())
            .finish()
    }
}
