//! CPU decoder: converts every layout to packed ARGB

use tracing::debug;

use super::DecodeBackend;
use super::convert;
use crate::pool::PixelPool;
use crate::types::{CodecKind, EncodedPacket, FramePayload, Resolution};
use crate::{PipelineError, Result};

/// Idle buffers kept by a standalone decoder
const DEFAULT_POOL_SIZE: usize = 4;

/// Software decode backend
///
/// Selected when hardware acceleration is off. Output is always
/// [`FramePayload::Argb`], one word per pixel, in buffers taken from a
/// [`PixelPool`] that is refilled whenever the layout changes.
#[derive(Debug)]
pub struct SoftwareDecoder {
    configured: Option<(Resolution, CodecKind, usize)>,
    pool: PixelPool,
}

impl SoftwareDecoder {
    pub fn new() -> Self {
        Self::with_pool(PixelPool::new(DEFAULT_POOL_SIZE))
    }

    pub fn with_pool(pool: PixelPool) -> Self {
        Self { configured: None, pool }
    }

    pub fn pool(&self) -> &PixelPool {
        &self.pool
    }
}

impl Default for SoftwareDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBackend for SoftwareDecoder {
    fn name(&self) -> &'static str {
        "software"
    }

    fn configure(&mut self, resolution: Resolution, codec: CodecKind) -> Result<()> {
        let len = convert::expected_len(codec, resolution).ok_or_else(|| {
            PipelineError::protocol("software decoder", format!("unsupported layout {} {}", codec, resolution))
        })?;
        debug!(%resolution, %codec, frame_bytes = len, "Software decoder configured");
        self.pool.prefill(resolution.pixels());
        self.configured = Some((resolution, codec, len));
        Ok(())
    }

    fn decode_video(&mut self, packet: &EncodedPacket) -> Result<FramePayload> {
        let Some((resolution, codec, len)) = self.configured else {
            return Err(PipelineError::decode(packet.sequence, "software decoder not configured"));
        };
        if packet.payload.len() != len {
            return Err(PipelineError::decode(
                packet.sequence,
                format!("{} {} payload is {} bytes, expected {}", codec, resolution, packet.payload.len(), len),
            ));
        }

        let mut pixels = self.pool.take(resolution.pixels());
        convert::to_argb(codec, &packet.payload, pixels.as_mut_vec());
        Ok(FramePayload::Argb(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FrameCache;
    use crate::capability::ProfileOverrides;
    use crate::test_utils::{pattern_packet, profile_with};
    use crate::types::{BuildVariant, DecodedFrame, StreamId};

    fn decode(decoder: &mut SoftwareDecoder, sequence: u64, resolution: Resolution) -> DecodedFrame {
        let packet = pattern_packet(StreamId(0), sequence, resolution, CodecKind::Bgra);
        let payload = decoder.decode_video(&packet).unwrap();
        DecodedFrame { stream_id: StreamId(0), sequence, pts: packet.capture_time, resolution, payload }
    }

    #[test]
    fn evicted_frames_hand_their_buffers_back() {
        let resolution = Resolution::new(8, 4);
        let overrides = ProfileOverrides {
            max_cache_depth: Some(2),
            hardware_acceleration: Some(false),
            ..Default::default()
        };
        let profile = profile_with(BuildVariant::Release, overrides);
        let cache = FrameCache::new(&profile);
        let mut decoder = SoftwareDecoder::with_pool(PixelPool::new(4));
        decoder.configure(resolution, CodecKind::Bgra).unwrap();
        assert_eq!(decoder.pool().idle(), 2);

        for sequence in 0..12 {
            cache.push(decode(&mut decoder, sequence, resolution)).unwrap();
        }

        // Two frames stay cached; every eviction returned a buffer, so only
        // the cached pair plus one in flight ever needed allocating.
        assert_eq!(cache.len(), 2);
        let pool = decoder.pool();
        assert!(pool.allocations() <= 1, "allocated {} buffers", pool.allocations());
        assert_eq!(pool.allocations() + pool.reuses(), 12);
    }

    #[test]
    fn layout_change_refills_the_pool() {
        let mut decoder = SoftwareDecoder::with_pool(PixelPool::new(6));
        decoder.configure(Resolution::new(4, 4), CodecKind::Bgra).unwrap();
        let frame = decode(&mut decoder, 0, Resolution::new(4, 4));
        drop(frame);
        assert_eq!(decoder.pool().idle(), 3);

        decoder.configure(Resolution::new(8, 8), CodecKind::Bgra).unwrap();
        assert_eq!(decoder.pool().idle(), 3);
        let frame = decode(&mut decoder, 1, Resolution::new(8, 8));
        match frame.payload {
            FramePayload::Argb(pixels) => assert_eq!(pixels.len(), 64),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
