//! Bounded cache of decoded frames awaiting presentation
//!
//! The cache is the only state shared between the decode role (pushes) and
//! the pacer role (pops). Each operation takes the lock once and never waits
//! on the other side:
//!
//! - A push into a full cache evicts the oldest frame synchronously.
//! - [`FrameCache::pop_latest`] returns the freshest frame and discards every
//!   older one, so a transient stall never turns into a standing backlog.
//!
//! ```text
//! push(f4)  [f1 f2 f3] -> evict f1 -> [f2 f3 f4]
//! pop_latest()         -> f4, skip f2 f3 -> []
//! ```
//!
//! Frames older than the newest admitted pts are rejected, except when the
//! jump back exceeds [`TIMELINE_RESET_THRESHOLD`]: that is a source restarting
//! its clock, and the cache follows the new timeline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, trace};

use crate::PipelineError;
use crate::metrics::StreamStats;
use crate::types::{CapabilityProfile, DecodedFrame, Resolution};

/// Backwards pts jump treated as a source timestamp reset
pub const TIMELINE_RESET_THRESHOLD: Duration = Duration::from_secs(1);

/// Result of an accepted push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The cache was full; the oldest frame was dropped to make room
    AcceptedWithEviction { evicted_sequence: u64 },
}

/// Why a frame was refused entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheRejection {
    #[error("frame {resolution} exceeds device limit {max}")]
    CapabilityExceeded { resolution: Resolution, max: Resolution },

    #[error("frame pts {pts:?} is older than cached pts {newest:?}")]
    Stale { pts: Duration, newest: Duration },
}

impl From<CacheRejection> for PipelineError {
    fn from(rejection: CacheRejection) -> Self {
        match rejection {
            CacheRejection::CapabilityExceeded { resolution, max } => PipelineError::CapabilityExceeded {
                width: resolution.width,
                height: resolution.height,
                max_width: max.width,
                max_height: max.height,
            },
            CacheRejection::Stale { pts, newest } => PipelineError::StaleFrame { pts, newest },
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    frames: VecDeque<DecodedFrame>,
    /// Largest pts ever admitted; keeps presentation order non-decreasing
    newest_pts: Option<Duration>,
}

/// Fixed-capacity ring of ready frames
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    max_resolution: Option<Resolution>,
    inner: Mutex<CacheInner>,
    stats: Arc<StreamStats>,
}

impl FrameCache {
    /// Create a cache sized by the profile, with its own counters
    pub fn new(profile: &CapabilityProfile) -> Self {
        Self::with_stats(profile, Arc::new(StreamStats::default()))
    }

    /// Create a cache sized by the profile, reporting into `stats`
    pub fn with_stats(profile: &CapabilityProfile, stats: Arc<StreamStats>) -> Self {
        let capacity = profile.max_cache_depth().max(1);
        Self {
            capacity,
            max_resolution: profile.max_resolution(),
            inner: Mutex::new(CacheInner {
                frames: VecDeque::with_capacity(capacity),
                newest_pts: None,
            }),
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a frame, evicting the oldest one when full.
    ///
    /// Frames over the profile's resolution cap, and frames slightly older
    /// than one already admitted, are rejected and dropped.
    pub fn push(&self, frame: DecodedFrame) -> Result<PushOutcome, CacheRejection> {
        if let Some(max) = self.max_resolution {
            if !frame.resolution.fits_within(max) {
                self.stats.capability_rejections.inc();
                return Err(CacheRejection::CapabilityExceeded { resolution: frame.resolution, max });
            }
        }

        let mut inner = self.lock();

        if let Some(newest) = inner.newest_pts {
            if newest.saturating_sub(frame.pts) > TIMELINE_RESET_THRESHOLD {
                info!(from = ?newest, to = ?frame.pts, sequence = frame.sequence, "Source timeline reset");
            } else if frame.pts < newest {
                self.stats.stale_rejections.inc();
                return Err(CacheRejection::Stale { pts: frame.pts, newest });
            }
        }

        let mut outcome = PushOutcome::Accepted;
        if inner.frames.len() >= self.capacity {
            if let Some(evicted) = inner.frames.pop_front() {
                self.stats.cache_evictions.inc();
                trace!(sequence = evicted.sequence, "Evicted oldest frame");
                outcome = PushOutcome::AcceptedWithEviction { evicted_sequence: evicted.sequence };
            }
        }

        inner.newest_pts = Some(frame.pts);
        inner.frames.push_back(frame);
        Ok(outcome)
    }

    /// Take the most recent frame, discarding every older one
    pub fn pop_latest(&self) -> Option<DecodedFrame> {
        let mut inner = self.lock();
        let latest = inner.frames.pop_back()?;
        let skipped = inner.frames.len();
        if skipped > 0 {
            inner.frames.clear();
            self.stats.frames_skipped.add(skipped as u64);
            trace!(skipped, sequence = latest.sequence, "Skipped stale frames on pop");
        }
        Some(latest)
    }

    /// Number of frames currently held
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Maximum number of frames held, fixed at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every held frame
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    /// Forget the newest admitted pts so the next frame starts a new timeline
    pub fn reset_timeline(&self) {
        self.lock().newest_pts = None;
    }

    /// Counters this cache reports into
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }
}
