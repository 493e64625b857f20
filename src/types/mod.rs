//! Core types for stream, packet and frame representation.
//!
//! - [`StreamHandle`] identifies one connected source and carries its cancellation token
//! - [`EncodedPacket`] is what a source produces, consumed once by the decoder
//! - [`DecodedFrame`] is what the decoder produces; it moves through the cache to the renderer
//! - [`CapabilityProfile`] is the immutable device-tier configuration every component reads
//!
//! ## Ownership
//!
//! Neither packets nor frames implement `Clone`. Each has exactly one owner at a
//! time, which the type system enforces as it moves between pipeline roles.
//!
//! ```rust
//! use ndiplay::types::{CodecKind, EncodedPacket, PacketFormat, Resolution, StreamId};
//! use std::time::Duration;
//!
//! let format = PacketFormat::Video { resolution: Resolution::new(2, 1), codec: CodecKind::Bgra };
//! let packet = EncodedPacket::new(StreamId(1), 0, Duration::ZERO, format, vec![0; 8]);
//! assert_eq!(packet.payload.len(), 8);
//! ```

mod frame;
mod packet;
mod profile;
mod stream;

pub use frame::{DecodedFrame, FramePayload};
pub use packet::{EncodedPacket, MediaKind, PacketFormat};
pub use profile::{BuildVariant, CapabilityProfile};
pub use stream::{CodecKind, MediaFlags, Resolution, SourceDescriptor, StreamHandle, StreamId};
