//! Decoded frames handed from the decoder towards the renderer

use std::sync::Arc;
use std::time::Duration;

use super::{CodecKind, Resolution, StreamId};
use crate::pool::PixelBuffer;

/// Decoded buffer contents
#[derive(Debug)]
pub enum FramePayload {
    /// Packed `0xAARRGGBB` pixels converted on the CPU, recycled on drop
    Argb(PixelBuffer),

    /// Untouched source layout, converted by the GPU at render time
    Native { codec: CodecKind, data: Arc<[u8]> },

    /// Interleaved samples
    Audio { samples: Vec<f32>, channels: u16, sample_rate: u32 },
}

/// A decoded, ready-to-present frame
///
/// Not `Clone`: a frame has exactly one owner at a time
/// (decoder, cache, pacer, renderer) and is dropped by the last one.
#[derive(Debug)]
pub struct DecodedFrame {
    pub stream_id: StreamId,

    /// Sequence number of the packet this frame was decoded from
    pub sequence: u64,

    /// Presentation timestamp relative to stream start
    pub pts: Duration,

    /// Pixel dimensions; zero for audio
    pub resolution: Resolution,

    pub payload: FramePayload,
}

impl DecodedFrame {
    pub fn is_audio(&self) -> bool {
        matches!(self.payload, FramePayload::Audio { .. })
    }

    /// Size of the decoded buffer in bytes
    pub fn byte_len(&self) -> usize {
        match &self.payload {
            FramePayload::Argb(pixels) => pixels.len() * 4,
            FramePayload::Native { data, .. } => data.len(),
            FramePayload::Audio { samples, .. } => samples.len() * 4,
        }
    }
}
