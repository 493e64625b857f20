//! Encoded packets as delivered by a packet source

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CodecKind, Resolution, StreamId};

/// Media carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Per-packet payload format
///
/// Sources report the format with every packet so that mid-stream changes
/// can be detected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    Video { resolution: Resolution, codec: CodecKind },
    Audio { channels: u16, sample_rate: u32 },
}

impl PacketFormat {
    pub fn kind(&self) -> MediaKind {
        match self {
            PacketFormat::Video { .. } => MediaKind::Video,
            PacketFormat::Audio { .. } => MediaKind::Audio,
        }
    }
}

/// One encoded unit pulled from a source
///
/// Not `Clone`: a packet is consumed exactly once by the decoder.
#[derive(Debug)]
pub struct EncodedPacket {
    /// Stream this packet belongs to
    pub stream_id: StreamId,

    /// Monotonic per-stream sequence number
    pub sequence: u64,

    /// Capture timestamp relative to stream start
    pub capture_time: Duration,

    /// When the packet was pulled off the source
    pub arrival: Instant,

    pub format: PacketFormat,

    /// Opaque payload bytes (shared so pass-through backends avoid a copy)
    pub payload: Arc<[u8]>,
}

impl EncodedPacket {
    /// Create a packet stamped with the current arrival time
    pub fn new(
        stream_id: StreamId,
        sequence: u64,
        capture_time: Duration,
        format: PacketFormat,
        payload: Vec<u8>,
    ) -> Self {
        Self { stream_id, sequence, capture_time, arrival: Instant::now(), format, payload: payload.into() }
    }

    pub fn kind(&self) -> MediaKind {
        self.format.kind()
    }
}
