//! GPU pass-through decoder

use tracing::debug;

use super::DecodeBackend;
use super::convert;
use crate::types::{CodecKind, EncodedPacket, FramePayload, Resolution};
use crate::{PipelineError, Result};

/// Hardware decode backend
///
/// Validates each payload against the configured layout and hands the
/// native bytes through untouched; colour conversion happens in the
/// renderer's shader. The payload buffer is shared, not copied.
#[derive(Debug, Default)]
pub struct HardwareDecoder {
    configured: Option<(Resolution, CodecKind, usize)>,
}

impl HardwareDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecodeBackend for HardwareDecoder {
    fn name(&self) -> &'static str {
        "hardware"
    }

    fn configure(&mut self, resolution: Resolution, codec: CodecKind) -> Result<()> {
        let len = convert::expected_len(codec, resolution).ok_or_else(|| {
            PipelineError::protocol("hardware decoder", format!("unsupported layout {} {}", codec, resolution))
        })?;
        debug!(%resolution, %codec, frame_bytes = len, "Hardware decoder configured");
        self.configured = Some((resolution, codec, len));
        Ok(())
    }

    fn decode_video(&mut self, packet: &EncodedPacket) -> Result<FramePayload> {
        let Some((resolution, codec, len)) = self.configured else {
            return Err(PipelineError::decode(packet.sequence, "hardware decoder not configured"));
        };
        if packet.payload.len() != len {
            return Err(PipelineError::decode(
                packet.sequence,
                format!("{} {} payload is {} bytes, expected {}", codec, resolution, packet.payload.len(), len),
            ));
        }
        Ok(FramePayload::Native { codec, data: packet.payload.clone() })
    }
}
