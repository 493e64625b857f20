//! Network receiver: pulls framed packets off a TCP stream source

use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::source::PacketSource;
use crate::types::{EncodedPacket, SourceDescriptor, StreamHandle, StreamId};
use crate::wire::{self, PacketHeader, StreamHeader};
use crate::{PipelineError, Result};

/// Default bound on establishing a connection and reading its header
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on waiting for the next packet to start
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Receive buffer; comfortably holds several 1080p UYVY frames' headers
const READ_BUFFER_SIZE: usize = 256 * 1024;

struct Connection {
    stream_id: StreamId,
    reader: BufReader<TcpStream>,
}

/// Packet source reading the length-prefixed framing from [`crate::wire`]
///
/// Each call makes a single attempt; retry is layered on top by
/// [`crate::retry`].
pub struct NetworkReceiver {
    connect_timeout: Duration,
    read_timeout: Duration,
    connection: Option<Connection>,
}

impl NetworkReceiver {
    /// Create a receiver with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self { connect_timeout, read_timeout, connection: None }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// True while a stream is open
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<(TcpStream, StreamHeader)> {
        let unavailable = |reason: &str, e: std::io::Error| {
            PipelineError::source_unavailable_with_source(descriptor.name.clone(), 1, reason, Box::new(e))
        };

        let connect = TcpStream::connect(descriptor.address.as_str());
        let mut stream = match timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(unavailable("connect failed", e)),
            Err(_) => {
                return Err(PipelineError::source_unavailable(
                    descriptor.name.clone(),
                    1,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on stream socket: {}", e);
        }

        let mut buf = [0u8; wire::STREAM_HEADER_LEN];
        match timeout(self.connect_timeout, stream.read_exact(&mut buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(unavailable("stream header read failed", e)),
            Err(_) => {
                return Err(PipelineError::source_unavailable(
                    descriptor.name.clone(),
                    1,
                    "source accepted but sent no stream header",
                ));
            }
        }

        Ok((stream, StreamHeader::decode(&buf)?))
    }
}

impl Default for NetworkReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PacketSource for NetworkReceiver {
    async fn connect(&mut self, descriptor: &SourceDescriptor) -> Result<StreamHandle> {
        self.connection = None;

        let (stream, header) = self.open(descriptor).await?;
        let handle = StreamHandle::new(descriptor.clone(), header.resolution, header.codec, header.media);

        info!(
            stream = %handle.id(),
            source = %descriptor,
            resolution = %header.resolution,
            codec = %header.codec,
            audio = header.media.audio,
            "Connected to stream source"
        );

        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
        self.connection = Some(Connection { stream_id: handle.id(), reader });
        Ok(handle)
    }

    async fn next_packet(&mut self, handle: &StreamHandle) -> Result<EncodedPacket> {
        let stream_id = handle.id();
        if handle.is_cancelled() {
            self.connection = None;
            return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
        }

        let read_timeout = self.read_timeout;
        let Some(conn) = self.connection.as_mut().filter(|c| c.stream_id == stream_id) else {
            return Err(PipelineError::protocol("next_packet", format!("stream {} is not connected", stream_id)));
        };

        let cancel = handle.token();

        // Waiting for a packet to start: timeouts are transient, EOF is a clean end.
        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            waited = timeout(read_timeout, conn.reader.fill_buf()) => Some(waited),
        };
        let available = match waited {
            None => {
                self.connection = None;
                return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
            }
            Some(Err(_)) => {
                return Err(PipelineError::transient_io(
                    "waiting for packet header",
                    std::io::Error::new(ErrorKind::TimedOut, format!("no data within {:?}", read_timeout)),
                ));
            }
            Some(Ok(Ok(buf))) => buf.len(),
            Some(Ok(Err(e))) => match e.kind() {
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    return Err(PipelineError::transient_io("waiting for packet header", e));
                }
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                    debug!(stream = %stream_id, "Peer reset the stream: {}", e);
                    self.connection = None;
                    return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
                }
                _ => {
                    self.connection = None;
                    return Err(PipelineError::io("waiting for packet header", e));
                }
            },
        };

        if available == 0 {
            debug!(stream = %stream_id, "Source closed the stream");
            self.connection = None;
            return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
        }

        // A packet has started: it must complete within the timeout.
        let read = async {
            let mut buf = [0u8; wire::PACKET_HEADER_LEN];
            conn.reader.read_exact(&mut buf).await?;
            let header = PacketHeader::decode(&buf)?;
            let mut payload = vec![0u8; header.len as usize];
            conn.reader.read_exact(&mut payload).await?;
            Ok::<_, PipelineError>((header, payload))
        };
        let completed = tokio::select! {
            _ = cancel.cancelled() => None,
            completed = timeout(read_timeout, read) => Some(completed),
        };

        match completed {
            Some(Ok(Ok((header, payload)))) => {
                trace!(
                    stream = %stream_id,
                    sequence = header.sequence,
                    bytes = payload.len(),
                    "Packet received"
                );
                Ok(header.into_packet(stream_id, payload))
            }
            None => {
                self.connection = None;
                Err(PipelineError::StreamEnded { stream_id: stream_id.0 })
            }
            Some(Ok(Err(e))) => {
                warn!(stream = %stream_id, "Stream broke mid-packet: {}", e);
                self.connection = None;
                Err(match e {
                    PipelineError::Io { source, .. } => {
                        PipelineError::protocol("packet body", format!("truncated packet: {}", source))
                    }
                    other => other,
                })
            }
            Some(Err(_)) => {
                warn!(stream = %stream_id, ?read_timeout, "Stream stalled mid-packet");
                self.connection = None;
                Err(PipelineError::protocol("packet body", format!("stalled mid-packet for {:?}", read_timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodecKind, MediaFlags, PacketFormat, Resolution};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn header() -> StreamHeader {
        StreamHeader { codec: CodecKind::Bgra, resolution: Resolution::new(2, 1), media: MediaFlags::VIDEO_ONLY }
    }

    async fn listener() -> (TcpListener, SourceDescriptor) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, SourceDescriptor::new("loopback", addr.to_string()))
    }

    fn video(sequence: u64) -> EncodedPacket {
        EncodedPacket::new(
            StreamId(0),
            sequence,
            Duration::from_millis(sequence * 40),
            PacketFormat::Video { resolution: Resolution::new(2, 1), codec: CodecKind::Bgra },
            vec![sequence as u8; 8],
        )
    }

    #[tokio::test]
    async fn receives_packets_then_clean_end() {
        let (listener, descriptor) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            wire::write_stream_header(&mut socket, &header()).await.unwrap();
            for seq in 0..3 {
                wire::write_packet(&mut socket, &video(seq)).await.unwrap();
            }
            socket.shutdown().await.unwrap();
        });

        let mut receiver = NetworkReceiver::new();
        let handle = receiver.connect(&descriptor).await.unwrap();
        assert_eq!(handle.resolution(), Resolution::new(2, 1));
        assert_eq!(handle.codec(), CodecKind::Bgra);

        for seq in 0..3 {
            let packet = receiver.next_packet(&handle).await.unwrap();
            assert_eq!(packet.sequence, seq);
            assert_eq!(packet.stream_id, handle.id());
            assert_eq!(packet.capture_time, Duration::from_millis(seq * 40));
            assert_eq!(&packet.payload[..], &[seq as u8; 8]);
        }

        let err = receiver.next_packet(&handle).await.unwrap_err();
        assert!(err.is_end_of_stream());
        assert!(!receiver.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_source_unavailable() {
        let (listener, descriptor) = listener().await;
        drop(listener);

        let mut receiver =
            NetworkReceiver::with_timeouts(Duration::from_millis(500), Duration::from_millis(100));
        let err = receiver.connect(&descriptor).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { attempts: 1, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn bad_handshake_is_protocol_error() {
        let (listener, descriptor) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"HTTP/1.1 400 Bad").await.unwrap();
        });

        let mut receiver = NetworkReceiver::new();
        let err = receiver.connect(&descriptor).await.unwrap_err();
        assert!(matches!(err, PipelineError::Protocol { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn idle_source_is_transient_and_stall_is_terminal() {
        let (listener, descriptor) = listener().await;
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            wire::write_stream_header(&mut socket, &header()).await.unwrap();
            let _ = release_rx.await;
            // Half a header, then silence.
            socket.write_all(&[0u8; 10]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut receiver = NetworkReceiver::with_timeouts(Duration::from_secs(1), Duration::from_millis(100));
        let handle = receiver.connect(&descriptor).await.unwrap();

        let err = receiver.next_packet(&handle).await.unwrap_err();
        assert!(matches!(err, PipelineError::TransientIo { .. }));
        assert!(receiver.is_connected());

        release_tx.send(()).unwrap();
        let err = receiver.next_packet(&handle).await.unwrap_err();
        assert!(matches!(err, PipelineError::Protocol { .. }), "got {err}");
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn cancelled_handle_ends_stream() {
        let (listener, descriptor) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            wire::write_stream_header(&mut socket, &header()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut receiver = NetworkReceiver::new();
        let handle = receiver.connect(&descriptor).await.unwrap();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = receiver.next_packet(&handle).await.unwrap_err();
        assert!(matches!(err, PipelineError::StreamEnded { .. }));
    }
}
