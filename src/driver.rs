//! Driver spawns and manages the per-stream pipeline tasks
//!
//! Three tasks share one stream's cancellation token:
//!
//! ```text
//! receiver --(bounded mpsc, backpressure)--> decoder --(push, drop-oldest)--> FrameCache --> pacer
//!                                               \--(bounded mpsc, try_send)--> audio
//! ```
//!
//! The receiver stops issuing reads, the decoder stops taking packets and the
//! pacer stops querying the cache as soon as the token is cancelled.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::PipelineError;
use crate::cache::{FrameCache, PushOutcome};
use crate::decoder::DecoderAdapter;
use crate::metrics::StreamStats;
use crate::pacer::{Pacer, Renderer};
use crate::pipeline::PipelineOptions;
use crate::retry::{RetryPolicy, next_packet_with_retry};
use crate::source::{PacketSource, SequenceCheck, SequenceTracker};
use crate::types::{CapabilityProfile, DecodedFrame, EncodedPacket, StreamHandle};

/// Lifecycle of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum StreamState {
    Connecting,
    Streaming,
    /// Source finished cleanly and every frame was presented
    Ended,
    /// Torn down by a fatal error
    Failed { reason: String },
    /// Shut down by the owner
    Stopped,
}

impl StreamState {
    /// Ended, failed and stopped streams never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Ended | StreamState::Failed { .. } | StreamState::Stopped)
    }
}

/// Shared sender for [`StreamState`] that refuses to leave a terminal state
#[derive(Debug, Clone)]
pub struct StatePublisher(Arc<watch::Sender<StreamState>>);

impl StatePublisher {
    pub fn new() -> (Self, watch::Receiver<StreamState>) {
        let (tx, rx) = watch::channel(StreamState::Connecting);
        (Self(Arc::new(tx)), rx)
    }

    /// Move to `next` unless already terminal; returns whether it changed
    pub fn publish(&self, next: StreamState) -> bool {
        self.0.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            debug!(from = ?current, to = ?next, "Stream state changed");
            *current = next;
            true
        })
    }

    pub fn current(&self) -> StreamState {
        self.0.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.0.subscribe()
    }
}

/// Join handles of the three roles
pub struct DriverTasks<R> {
    pub receiver: JoinHandle<()>,
    pub decoder: JoinHandle<()>,
    pub pacer: JoinHandle<R>,
}

/// Result of spawning driver tasks
pub struct DriverChannels<R> {
    /// Decoded audio, in arrival order
    pub audio: mpsc::Receiver<DecodedFrame>,
    /// Counters shared by every role
    pub stats: Arc<StreamStats>,
    /// Set once the decoder has pushed its last frame
    pub finished: CancellationToken,
    pub tasks: DriverTasks<R>,
}

/// Driver spawns and manages the tasks of one connected stream
pub struct Driver;

impl Driver {
    /// Spawn receiver, decoder and pacer tasks for a connected `handle`
    pub fn spawn<S, R>(
        source: S,
        handle: StreamHandle,
        profile: &CapabilityProfile,
        renderer: R,
        options: &PipelineOptions,
        state: StatePublisher,
    ) -> DriverChannels<R>
    where
        S: PacketSource,
        R: Renderer,
    {
        let stats = Arc::new(StreamStats::default());
        let cache = Arc::new(FrameCache::with_stats(profile, stats.clone()));
        let decoder = DecoderAdapter::new(&handle, profile, stats.clone());
        let pacer = Pacer::new(cache.clone(), profile);

        let (packet_tx, packet_rx) = mpsc::channel(options.packet_channel_capacity.max(1));
        let (audio_tx, audio_rx) = mpsc::channel(options.audio_channel_capacity.max(1));
        let finished = CancellationToken::new();

        state.publish(StreamState::Streaming);

        let receiver = tokio::spawn(Self::receiver_task(
            source,
            handle.clone(),
            options.read_retry,
            packet_tx,
            stats.clone(),
            state.clone(),
        ));

        let decoder = tokio::spawn(Self::decoder_task(
            decoder,
            handle.clone(),
            packet_rx,
            cache,
            audio_tx,
            finished.clone(),
            state.clone(),
        ));

        let cancel = handle.token();
        let pacer_finished = finished.clone();
        let pacer = tokio::spawn(async move {
            let renderer = pacer.run(renderer, cancel.clone(), pacer_finished).await;
            if cancel.is_cancelled() {
                state.publish(StreamState::Stopped);
            } else {
                state.publish(StreamState::Ended);
            }
            renderer
        });

        DriverChannels { audio: audio_rx, stats, finished, tasks: DriverTasks { receiver, decoder, pacer } }
    }

    /// Receiver task - pulls packets, tracks sequence numbers, feeds the decoder
    async fn receiver_task<S>(
        mut source: S,
        handle: StreamHandle,
        policy: RetryPolicy,
        packet_tx: mpsc::Sender<EncodedPacket>,
        stats: Arc<StreamStats>,
        state: StatePublisher,
    ) where
        S: PacketSource,
    {
        let stream = handle.id();
        let cancel = handle.token();
        let mut tracker = SequenceTracker::new();
        info!(%stream, "Receiver task started");

        loop {
            if cancel.is_cancelled() {
                debug!(%stream, "Receiver cancelled");
                break;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%stream, "Receiver cancelled during read");
                    break;
                }
                result = next_packet_with_retry(&mut source, &handle, &policy, &stats) => result,
            };

            let packet = match result {
                Ok(packet) => packet,
                Err(e) if e.is_end_of_stream() => {
                    info!(%stream, received = stats.packets_received.get(), "Source ended stream");
                    break;
                }
                Err(e) => {
                    error!(%stream, "Receiver failed, tearing stream down: {}", e);
                    state.publish(StreamState::Failed { reason: e.to_string() });
                    handle.cancel();
                    break;
                }
            };

            stats.packets_received.inc();
            match tracker.observe(packet.sequence) {
                SequenceCheck::InOrder => {}
                SequenceCheck::Gap { expected, missing } => {
                    stats.sequence_gaps.inc();
                    stats.packets_lost.add(missing);
                    warn!(%stream, expected, got = packet.sequence, missing, "Sequence gap");
                }
                SequenceCheck::Stale { expected } => {
                    stats.packets_stale.inc();
                    debug!(%stream, expected, got = packet.sequence, "Dropped stale packet");
                    continue;
                }
            }

            trace!(%stream, sequence = packet.sequence, "Forwarding packet");

            // Backpressure: wait for the decoder, but never past cancellation.
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = packet_tx.send(packet) => {
                    if sent.is_err() {
                        debug!(%stream, "Decoder gone, receiver shutting down");
                        break;
                    }
                }
            }
        }

        info!(%stream, "Receiver task stopped");
    }

    /// Decoder task - decodes packets and routes video to the cache, audio to its channel
    async fn decoder_task(
        mut decoder: DecoderAdapter,
        handle: StreamHandle,
        mut packet_rx: mpsc::Receiver<EncodedPacket>,
        cache: Arc<FrameCache>,
        audio_tx: mpsc::Sender<DecodedFrame>,
        finished: CancellationToken,
        state: StatePublisher,
    ) {
        let stream = handle.id();
        let cancel = handle.token();
        let stats = cache.stats().clone();
        info!(%stream, backend = decoder.backend_name(), "Decoder task started");

        loop {
            let packet = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%stream, "Decoder cancelled");
                    break;
                }
                packet = packet_rx.recv() => match packet {
                    Some(packet) => packet,
                    None => {
                        debug!(%stream, "Packet channel closed, decoder drained");
                        break;
                    }
                },
            };

            // Conversion is CPU-bound; keep it off the thread the pacer ticks on.
            let reinits = stats.decoder_reinits.get();
            let decoded = tokio::task::spawn_blocking(move || {
                let result = decoder.decode(packet);
                (decoder, result)
            })
            .await;
            let result = match decoded {
                Ok((returned, result)) => {
                    decoder = returned;
                    result
                }
                Err(e) => {
                    error!(%stream, "Decode task failed: {}", e);
                    state.publish(StreamState::Failed { reason: format!("decode task failed: {e}") });
                    handle.cancel();
                    break;
                }
            };

            if stats.decoder_reinits.get() != reinits {
                // A new format may come with a new clock.
                cache.reset_timeline();
            }

            let frame = match result {
                Ok(frame) => frame,
                Err(e @ PipelineError::StreamFailed { .. }) => {
                    state.publish(StreamState::Failed { reason: e.to_string() });
                    handle.cancel();
                    break;
                }
                // Logged and counted by the adapter
                Err(_) => continue,
            };

            if frame.is_audio() {
                match audio_tx.try_send(frame) {
                    Ok(()) => stats.audio_delivered.inc(),
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        stats.audio_dropped.inc();
                        let e = PipelineError::CacheFull { capacity: audio_tx.max_capacity() };
                        warn!(%stream, sequence = dropped.sequence, "Audio frame dropped: {}", e);
                    }
                    Err(mpsc::error::TrySendError::Closed(dropped)) => {
                        stats.audio_dropped.inc();
                        trace!(%stream, sequence = dropped.sequence, "Audio receiver closed, dropped frame");
                    }
                }
                continue;
            }

            match cache.push(frame) {
                Ok(PushOutcome::Accepted) => {}
                Ok(PushOutcome::AcceptedWithEviction { evicted_sequence }) => {
                    let e = PipelineError::CacheFull { capacity: cache.capacity() };
                    debug!(%stream, evicted_sequence, "{}, evicted oldest frame", e);
                }
                Err(rejection) => {
                    warn!(%stream, "Frame dropped: {}", PipelineError::from(rejection));
                }
            }
        }

        finished.cancel();
        info!(%stream, decoded = stats.frames_decoded.get(), "Decoder task stopped");
    }
}
