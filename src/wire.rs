//! Stream framing spoken by the network receiver.
//!
//! A connection opens with a 15-byte stream header, followed by any number
//! of packets. Every integer is little-endian.
//!
//! ```text
//! stream header: "NDIP" | version u8 | codec u8 | width u32 | height u32 | media u8
//! packet header: sequence u64 | capture_us u64 | kind u8 | codec u8
//!                | width u32 | height u32 | len u32
//! packet body:   len bytes
//! ```
//!
//! For audio packets `width` carries the channel count and `height` the
//! sample rate.

use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::types::{CodecKind, EncodedPacket, MediaFlags, MediaKind, PacketFormat, Resolution, StreamId};
use crate::{PipelineError, Result};

pub const MAGIC: [u8; 4] = *b"NDIP";
pub const VERSION: u8 = 1;
pub const STREAM_HEADER_LEN: usize = 15;
pub const PACKET_HEADER_LEN: usize = 30;

/// Largest payload a packet may declare
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

const KIND_VIDEO: u8 = 0;
const KIND_AUDIO: u8 = 1;

/// Format negotiated when a connection opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub codec: CodecKind,
    pub resolution: Resolution,
    pub media: MediaFlags,
}

impl StreamHeader {
    pub fn encode(&self) -> [u8; STREAM_HEADER_LEN] {
        let mut buf = [0u8; STREAM_HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = VERSION;
        buf[5] = self.codec.to_wire();
        buf[6..10].copy_from_slice(&self.resolution.width.to_le_bytes());
        buf[10..14].copy_from_slice(&self.resolution.height.to_le_bytes());
        buf[14] = self.media.to_wire();
        buf
    }

    pub fn decode(buf: &[u8; STREAM_HEADER_LEN]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(PipelineError::protocol("stream header", format!("bad magic {:02x?}", &buf[0..4])));
        }
        if buf[4] != VERSION {
            return Err(PipelineError::protocol(
                "stream header",
                format!("unsupported version {} (expected {})", buf[4], VERSION),
            ));
        }
        let codec = CodecKind::from_wire(buf[5])
            .ok_or_else(|| PipelineError::protocol("stream header", format!("unknown codec id {}", buf[5])))?;
        Ok(StreamHeader {
            codec,
            resolution: Resolution::new(read_u32(&buf[6..10]), read_u32(&buf[10..14])),
            media: MediaFlags::from_wire(buf[14]),
        })
    }
}

/// Fixed-size header preceding every packet body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u64,
    pub capture_us: u64,
    pub format: PacketFormat,
    pub len: u32,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; PACKET_HEADER_LEN] {
        let (kind, codec, a, b) = match self.format {
            PacketFormat::Video { resolution, codec } => {
                (KIND_VIDEO, codec.to_wire(), resolution.width, resolution.height)
            }
            PacketFormat::Audio { channels, sample_rate } => {
                (KIND_AUDIO, CodecKind::PcmF32.to_wire(), channels as u32, sample_rate)
            }
        };

        let mut buf = [0u8; PACKET_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.sequence.to_le_bytes());
        buf[8..16].copy_from_slice(&self.capture_us.to_le_bytes());
        buf[16] = kind;
        buf[17] = codec;
        buf[18..22].copy_from_slice(&a.to_le_bytes());
        buf[22..26].copy_from_slice(&b.to_le_bytes());
        buf[26..30].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; PACKET_HEADER_LEN]) -> Result<Self> {
        let sequence = read_u64(&buf[0..8]);
        let capture_us = read_u64(&buf[8..16]);
        let a = read_u32(&buf[18..22]);
        let b = read_u32(&buf[22..26]);
        let len = read_u32(&buf[26..30]);

        if len > MAX_PAYLOAD_LEN {
            return Err(PipelineError::protocol(
                "packet header",
                format!("packet {} declares {} bytes (max {})", sequence, len, MAX_PAYLOAD_LEN),
            ));
        }

        let format = match buf[16] {
            KIND_VIDEO => {
                let codec = CodecKind::from_wire(buf[17]).filter(|c| c.is_video()).ok_or_else(|| {
                    PipelineError::protocol("packet header", format!("unknown video codec id {}", buf[17]))
                })?;
                PacketFormat::Video { resolution: Resolution::new(a, b), codec }
            }
            KIND_AUDIO => {
                if buf[17] != CodecKind::PcmF32.to_wire() {
                    return Err(PipelineError::protocol(
                        "packet header",
                        format!("unknown audio codec id {}", buf[17]),
                    ));
                }
                let channels = u16::try_from(a).map_err(|_| {
                    PipelineError::protocol("packet header", format!("{} audio channels", a))
                })?;
                PacketFormat::Audio { channels, sample_rate: b }
            }
            other => {
                return Err(PipelineError::protocol("packet header", format!("unknown media kind {}", other)));
            }
        };

        Ok(PacketHeader { sequence, capture_us, format, len })
    }

    /// Header describing an outgoing packet
    pub fn for_packet(packet: &EncodedPacket) -> Result<Self> {
        let len = u32::try_from(packet.payload.len())
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD_LEN)
            .ok_or_else(|| {
                let details = format!("payload of {} bytes too large", packet.payload.len());
                PipelineError::protocol("packet encode", details)
            })?;
        Ok(PacketHeader {
            sequence: packet.sequence,
            capture_us: packet.capture_time.as_micros() as u64,
            format: packet.format,
            len,
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.format.kind()
    }

    pub fn capture_time(&self) -> Duration {
        Duration::from_micros(self.capture_us)
    }

    /// Assemble the packet once its body has been read
    pub fn into_packet(self, stream_id: StreamId, payload: Vec<u8>) -> EncodedPacket {
        EncodedPacket::new(stream_id, self.sequence, self.capture_time(), self.format, payload)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Write a stream header
pub async fn write_stream_header<W>(writer: &mut W, header: &StreamHeader) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&header.encode()).await.map_err(|e| PipelineError::io("writing stream header", e))
}

/// Write one packet, header then body
pub async fn write_packet<W>(writer: &mut W, packet: &EncodedPacket) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = PacketHeader::for_packet(packet)?;
    writer.write_all(&header.encode()).await.map_err(|e| PipelineError::io("writing packet header", e))?;
    writer.write_all(&packet.payload).await.map_err(|e| PipelineError::io("writing packet body", e))
}
