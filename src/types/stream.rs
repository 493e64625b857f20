//! Stream identity: source descriptors, codecs, resolutions, handles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Process-unique identifier of one connected stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Allocate a fresh stream id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        StreamId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where to find a stream source on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Human-readable source name (e.g. "STUDIO-PC (Camera 1)")
    pub name: String,

    /// `host:port` of the stream endpoint
    pub address: String,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self { name: name.into(), address: address.into() }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Pixel width and height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn pixels(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when neither dimension exceeds `max`
    pub fn fits_within(self, max: Resolution) -> bool {
        self.width <= max.width && self.height <= max.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Payload layout of a packet.
///
/// Video kinds mirror the raw FourCC layouts an NDI receiver delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum CodecKind {
    /// 4:2:2 packed, U Y0 V Y1 per pixel pair
    Uyvy,
    Bgra,
    /// BGRA with the alpha byte ignored
    Bgrx,
    Rgba,
    /// RGBA with the alpha byte ignored
    Rgbx,
    /// Interleaved little-endian f32 samples
    PcmF32,
}

impl CodecKind {
    /// Wire identifier
    pub fn to_wire(self) -> u8 {
        match self {
            CodecKind::Uyvy => 1,
            CodecKind::Bgra => 2,
            CodecKind::Bgrx => 3,
            CodecKind::Rgba => 4,
            CodecKind::Rgbx => 5,
            CodecKind::PcmF32 => 16,
        }
    }

    /// Parse a wire identifier
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(CodecKind::Uyvy),
            2 => Some(CodecKind::Bgra),
            3 => Some(CodecKind::Bgrx),
            4 => Some(CodecKind::Rgba),
            5 => Some(CodecKind::Rgbx),
            16 => Some(CodecKind::PcmF32),
            _ => None,
        }
    }

    pub fn is_video(self) -> bool {
        !matches!(self, CodecKind::PcmF32)
    }

    /// Bytes per pixel for video layouts, bytes per sample for audio
    pub fn bytes_per_unit(self) -> usize {
        match self {
            CodecKind::Uyvy => 2,
            CodecKind::Bgra | CodecKind::Bgrx | CodecKind::Rgba | CodecKind::Rgbx => 4,
            CodecKind::PcmF32 => 4,
        }
    }

    /// FourCC name
    pub fn fourcc(self) -> &'static str {
        match self {
            CodecKind::Uyvy => "UYVY",
            CodecKind::Bgra => "BGRA",
            CodecKind::Bgrx => "BGRX",
            CodecKind::Rgba => "RGBA",
            CodecKind::Rgbx => "RGBX",
            CodecKind::PcmF32 => "FLTP",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Which media a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    pub video: bool,
    pub audio: bool,
}

impl MediaFlags {
    pub const VIDEO_ONLY: MediaFlags = MediaFlags { video: true, audio: false };
    pub const AUDIO_VIDEO: MediaFlags = MediaFlags { video: true, audio: true };

    pub fn to_wire(self) -> u8 {
        (self.video as u8) | ((self.audio as u8) << 1)
    }

    pub fn from_wire(value: u8) -> Self {
        MediaFlags { video: value & 0b01 != 0, audio: value & 0b10 != 0 }
    }
}

/// One active network source
///
/// Cloning a handle shares its cancellation token: cancelling any clone
/// tears the stream down for every role holding one.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    id: StreamId,
    source: SourceDescriptor,
    resolution: Resolution,
    codec: CodecKind,
    media: MediaFlags,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Create a handle for a freshly negotiated stream
    pub fn new(
        source: SourceDescriptor,
        resolution: Resolution,
        codec: CodecKind,
        media: MediaFlags,
    ) -> Self {
        Self { id: StreamId::next(), source, resolution, codec, media, cancel: CancellationToken::new() }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    /// Resolution negotiated at connect time
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Codec negotiated at connect time
    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    pub fn media(&self) -> MediaFlags {
        self.media
    }

    /// Tear the stream down for every role
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the stream is torn down
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
