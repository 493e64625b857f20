//! Bounded exponential backoff for connect and read retries

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::StreamStats;
use crate::source::PacketSource;
use crate::types::{EncodedPacket, SourceDescriptor, StreamHandle};
use crate::{PipelineError, Result};

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failure; doubles on each subsequent one
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Connect policy: three attempts starting 500ms apart
    pub const CONNECT: RetryPolicy = RetryPolicy { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 2_000 };

    /// Read policy: five attempts with 50ms, 100ms, 200ms, ... backoff
    pub const READ: RetryPolicy = RetryPolicy { max_attempts: 5, base_delay_ms: 50, max_delay_ms: 1_600 };

    /// Delay to wait after `failures` consecutive failures (1-based)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PipelineError::config("retry max_attempts must be at least 1"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(PipelineError::config("retry max_delay_ms must be >= base_delay_ms"));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::READ
    }
}

/// Connect to a source, retrying `SourceUnavailable` with backoff.
///
/// Non-retryable errors are returned immediately. After the bound is
/// exhausted the last error is surfaced with the total attempt count.
pub async fn connect_with_retry<S>(
    source: &mut S,
    descriptor: &SourceDescriptor,
    policy: &RetryPolicy,
) -> Result<StreamHandle>
where
    S: PacketSource + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.connect(descriptor).await {
            Ok(handle) => {
                if attempt > 1 {
                    debug!(source = %descriptor, attempt, "Connected after retry");
                }
                return Ok(handle);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    source = %descriptor,
                    attempt,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    "Connect failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.with_attempts(attempt)),
        }
    }
}

/// Pull the next packet, silently retrying transient read errors.
///
/// Each retry is counted in `stats`. `StreamEnded` and other terminal
/// errors pass straight through.
pub async fn next_packet_with_retry<S>(
    source: &mut S,
    handle: &StreamHandle,
    policy: &RetryPolicy,
    stats: &StreamStats,
) -> Result<EncodedPacket>
where
    S: PacketSource + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.next_packet(handle).await {
            Ok(packet) => return Ok(packet),
            Err(e @ PipelineError::TransientIo { .. }) if attempt < policy.max_attempts => {
                stats.transient_retries.inc();
                let delay = policy.delay_for(attempt);
                debug!(stream = %handle.id(), attempt, ?delay, "Transient read error, retrying: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.with_attempts(attempt)),
        }
    }
}
