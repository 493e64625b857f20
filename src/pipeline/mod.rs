//! Stream pipeline: one connected source playing through to one renderer

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::driver::{Driver, DriverTasks, StatePublisher, StreamState};
use crate::metrics::{StatsSnapshot, StreamStats};
use crate::pacer::Renderer;
use crate::retry::{RetryPolicy, connect_with_retry};
use crate::source::PacketSource;
use crate::types::{CapabilityProfile, DecodedFrame, SourceDescriptor, StreamHandle};
use crate::{PipelineError, Result};


/// Tuning that is independent of the device tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    pub connect_retry: RetryPolicy,
    pub read_retry: RetryPolicy,

    /// Packets buffered between receiver and decoder
    pub packet_channel_capacity: usize,

    /// Decoded audio frames buffered for the consumer
    pub audio_channel_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            connect_retry: RetryPolicy::CONNECT,
            read_retry: RetryPolicy::READ,
            packet_channel_capacity: 8,
            audio_channel_capacity: 16,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        self.connect_retry.validate()?;
        self.read_retry.validate()?;
        if self.packet_channel_capacity == 0 {
            return Err(PipelineError::config("packet_channel_capacity must be at least 1"));
        }
        if self.audio_channel_capacity == 0 {
            return Err(PipelineError::config("audio_channel_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// A running stream
///
/// Dropping the pipeline cancels every task; call [`StreamPipeline::join`]
/// to wait for them and get the renderer back.
pub struct StreamPipeline<R> {
    handle: StreamHandle,
    profile: Arc<CapabilityProfile>,
    state: StatePublisher,
    state_rx: watch::Receiver<StreamState>,
    stats: Arc<StreamStats>,
    audio: Option<mpsc::Receiver<DecodedFrame>>,
    tasks: Option<DriverTasks<R>>,
}

impl<R: Renderer> StreamPipeline<R> {
    /// Connect to `descriptor` through `source` and start playback.
    ///
    /// Connect is retried per `options.connect_retry`; once the bound is
    /// exhausted the last `SourceUnavailable` is returned.
    pub async fn start<S>(
        mut source: S,
        descriptor: &SourceDescriptor,
        profile: Arc<CapabilityProfile>,
        renderer: R,
        options: PipelineOptions,
    ) -> Result<Self>
    where
        S: PacketSource,
    {
        options.validate()?;
        let (state, state_rx) = StatePublisher::new();

        info!(source = %descriptor, variant = %profile.variant(), "Starting stream pipeline");
        let handle = connect_with_retry(&mut source, descriptor, &options.connect_retry).await?;

        let channels = Driver::spawn(source, handle.clone(), &profile, renderer, &options, state.clone());

        info!(
            stream = %handle.id(),
            resolution = %handle.resolution(),
            codec = %handle.codec(),
            "Stream pipeline running"
        );

        Ok(Self {
            handle,
            profile,
            state,
            state_rx,
            stats: channels.stats,
            audio: Some(channels.audio),
            tasks: Some(channels.tasks),
        })
    }

    /// Handle of the connected stream
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn profile(&self) -> &Arc<CapabilityProfile> {
        &self.profile
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state_rx.borrow().clone()
    }

    /// State changes as a stream, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = StreamState> + 'static {
        WatchStream::new(self.state_rx.clone())
    }

    /// Wait until the stream reaches a terminal state
    pub async fn finished(&self) -> StreamState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(StreamState::is_terminal).await {
            Ok(state) => state.clone(),
            // Every publisher is gone, so nothing can change any more.
            Err(_) => self.state(),
        }
    }

    /// Point-in-time copy of the stream's counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Take the decoded audio channel; returns `None` after the first call
    pub fn take_audio(&mut self) -> Option<mpsc::Receiver<DecodedFrame>> {
        self.audio.take()
    }

    /// Stop every role; already-terminal streams keep their state
    pub fn shutdown(&self) {
        info!(stream = %self.handle.id(), "Shutting down stream pipeline");
        self.state.publish(StreamState::Stopped);
        self.handle.cancel();
    }

    /// Wait for every role to stop and return the renderer
    pub async fn join(mut self) -> Result<R> {
        let Some(tasks) = self.tasks.take() else {
            return Err(PipelineError::config("pipeline already joined"));
        };
        let stream_id = self.handle.id().0;
        let panicked = |role: &str, e: tokio::task::JoinError| PipelineError::StreamFailed {
            stream_id,
            consecutive_errors: 0,
            reason: format!("{} task panicked: {}", role, e),
        };

        let renderer = tasks.pacer.await.map_err(|e| panicked("pacer", e))?;
        tasks.decoder.await.map_err(|e| panicked("decoder", e))?;
        tasks.receiver.await.map_err(|e| panicked("receiver", e))?;

        debug!(stream = stream_id, state = ?self.state(), stats = %self.stats(), "Stream pipeline joined");
        Ok(renderer)
    }
}

impl<R> Drop for StreamPipeline<R> {
    fn drop(&mut self) {
        if self.tasks.is_some() {
            debug!(stream = %self.handle.id(), "Dropping stream pipeline");
            self.state.publish(StreamState::Stopped);
        }
        self.handle.cancel();
    }
}
