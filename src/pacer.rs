//! Fixed-cadence presentation.
//!
//! The pacer wakes once per frame period, takes the freshest frame from the
//! [`FrameCache`] and hands it to the [`Renderer`]. When nothing new is
//! ready it asks the renderer to repeat the last frame instead.
//!
//! A wakeup that arrives more than one period late skips exactly the ticks
//! that were missed and realigns to the original grid:
//!
//! ```text
//! deadlines: 0    p    2p   3p   4p
//! wakeups:   0               3.5p      woken for p: p and 2p missed
//!                                 4p   back on the grid
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::PipelineError;
use crate::cache::FrameCache;
use crate::metrics::StreamStats;
use crate::types::{CapabilityProfile, DecodedFrame};

/// Presentation sink
///
/// Called from the pacer task only; implementations must not block.
pub trait Renderer: Send + 'static {
    /// Show a new frame; the renderer takes ownership
    fn present(&mut self, frame: DecodedFrame);

    /// Show the previously presented frame again
    fn repeat_last(&mut self) {}
}

/// Deadline grid for a fixed period
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
    next: Instant,
}

impl Cadence {
    /// Grid whose first deadline is `start`
    pub fn new(period: Duration, start: Instant) -> Self {
        Self { period: period.max(Duration::from_nanos(1)), next: start }
    }

    /// Deadline of the upcoming tick
    pub fn deadline(&self) -> Instant {
        self.next
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Consume the current tick, woken at `now`.
    ///
    /// Returns how many whole ticks were missed since the deadline and moves
    /// the deadline past them.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let late = now.saturating_duration_since(self.next);
        let missed = (late.as_nanos() / self.period.as_nanos()) as u64;
        let step = self.period.as_nanos().saturating_mul(missed as u128 + 1);
        self.next += Duration::from_nanos(u64::try_from(step).unwrap_or(u64::MAX));
        missed
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented { sequence: u64 },
    Repeated,
    /// Nothing has been presented yet and nothing was ready
    Idle,
}

/// Drives a renderer from a frame cache at the profile's frame rate
#[derive(Debug)]
pub struct Pacer {
    cache: Arc<FrameCache>,
    stats: Arc<StreamStats>,
    period: Duration,
    last_presented: Option<Instant>,
}

impl Pacer {
    pub fn new(cache: Arc<FrameCache>, profile: &CapabilityProfile) -> Self {
        let stats = cache.stats().clone();
        Self { cache, stats, period: profile.frame_period(), last_presented: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one presentation step without waiting
    pub fn tick<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> TickOutcome {
        match self.cache.pop_latest() {
            Some(frame) => {
                let sequence = frame.sequence;
                trace!(sequence, pts = ?frame.pts, "Presenting frame");
                renderer.present(frame);
                let now = Instant::now();
                if let Some(previous) = self.last_presented.replace(now) {
                    self.stats.present_interval.record(now - previous);
                }
                self.stats.frames_presented.inc();
                TickOutcome::Presented { sequence }
            }
            None if self.last_presented.is_some() => {
                renderer.repeat_last();
                self.stats.frames_repeated.inc();
                TickOutcome::Repeated
            }
            None => TickOutcome::Idle,
        }
    }

    /// Present until `cancel` fires, or until `finished` is set and the
    /// cache has drained. Returns the renderer.
    pub async fn run<R: Renderer>(
        mut self,
        mut renderer: R,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> R {
        info!(period = ?self.period, "Pacer started");
        let mut cadence = Cadence::new(self.period, Instant::now());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Pacer cancelled");
                    break;
                }
                _ = sleep_until(cadence.deadline()) => {}
            }

            let now = Instant::now();
            let lag = now.saturating_duration_since(cadence.deadline());
            let missed = cadence.advance(now);
            if missed > 0 {
                self.stats.drift_events.inc();
                self.stats.missed_ticks.add(missed);
                warn!("{}", PipelineError::TimingDrift { missed_ticks: missed, lag });
            }

            self.tick(&mut renderer);

            if finished.is_cancelled() && self.cache.is_empty() {
                debug!("Source finished and cache drained");
                break;
            }
        }

        let stats = self.stats.snapshot();
        info!(
            presented = stats.frames_presented,
            repeated = stats.frames_repeated,
            missed_ticks = stats.missed_ticks,
            "Pacer stopped"
        );
        renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityController;
    use crate::test_utils::{RecordingRenderer, video_frame};
    use crate::types::BuildVariant;
    use tokio::sync::mpsc;

    fn low_end() -> (Arc<FrameCache>, CapabilityProfile) {
        let profile = CapabilityController::resolve(BuildVariant::LowEnd);
        (Arc::new(FrameCache::new(&profile)), profile)
    }

    /// Forwards every presented sequence to the test
    struct ChannelRenderer(mpsc::UnboundedSender<u64>);

    impl Renderer for ChannelRenderer {
        fn present(&mut self, frame: DecodedFrame) {
            let _ = self.0.send(frame.sequence);
        }
    }

    #[test]
    fn cadence_counts_whole_missed_ticks() {
        let start = Instant::now();
        let period = Duration::from_millis(50);
        let mut cadence = Cadence::new(period, start);

        assert_eq!(cadence.advance(start), 0);
        assert_eq!(cadence.deadline(), start + period);

        // Woken 2.5 periods after the deadline: two ticks lost.
        assert_eq!(cadence.advance(start + period * 7 / 2), 2);
        assert_eq!(cadence.deadline(), start + period * 4);

        // Slightly late but within a period: nothing missed.
        assert_eq!(cadence.advance(start + period * 4 + Duration::from_millis(10)), 0);
        assert_eq!(cadence.deadline(), start + period * 5);
    }

    #[test]
    fn tick_presents_then_repeats() {
        let (cache, profile) = low_end();
        let mut pacer = Pacer::new(cache.clone(), &profile);
        let mut renderer = RecordingRenderer::default();

        assert_eq!(pacer.tick(&mut renderer), TickOutcome::Idle);
        assert_eq!(renderer.repeats, 0, "nothing to repeat before the first frame");

        cache.push(video_frame(1, 0, 64, 64)).unwrap();
        assert_eq!(pacer.tick(&mut renderer), TickOutcome::Presented { sequence: 1 });
        assert_eq!(pacer.tick(&mut renderer), TickOutcome::Repeated);
        assert_eq!(renderer.presented, vec![1]);
        assert_eq!(renderer.repeats, 1);

        let stats = cache.stats().snapshot();
        assert_eq!(stats.frames_presented, 1);
        assert_eq!(stats.frames_repeated, 1);
    }

    #[test]
    fn tick_takes_freshest_frame() {
        let (cache, profile) = low_end();
        let mut pacer = Pacer::new(cache.clone(), &profile);
        let mut renderer = RecordingRenderer::default();

        cache.push(video_frame(1, 0, 64, 64)).unwrap();
        cache.push(video_frame(2, 50, 64, 64)).unwrap();
        assert_eq!(pacer.tick(&mut renderer), TickOutcome::Presented { sequence: 2 });
        assert_eq!(cache.stats().snapshot().frames_skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_wakeup_skips_missed_ticks_and_presents_latest() {
        let (cache, profile) = low_end();
        let period = profile.frame_period();
        let pacer = Pacer::new(cache.clone(), &profile);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        cache.push(video_frame(1, 0, 64, 64)).unwrap();
        let task = tokio::spawn(pacer.run(ChannelRenderer(tx), cancel.clone(), CancellationToken::new()));
        assert_eq!(rx.recv().await, Some(1));

        // The pacer is now asleep until `period`. Frames arrive, then the
        // wakeup is delayed to 3.5 periods.
        cache.push(video_frame(2, 50, 64, 64)).unwrap();
        cache.push(video_frame(3, 100, 64, 64)).unwrap();
        tokio::time::advance(period * 7 / 2).await;

        assert_eq!(rx.recv().await, Some(3), "latest frame, no backlog replay");

        let stats = cache.stats().snapshot();
        assert_eq!(stats.missed_ticks, 2);
        assert_eq!(stats.drift_events, 1);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.frames_presented, 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_finished_and_drained() {
        let (cache, profile) = low_end();
        let pacer = Pacer::new(cache.clone(), &profile);
        let finished = CancellationToken::new();

        cache.push(video_frame(1, 0, 64, 64)).unwrap();
        finished.cancel();

        let renderer = pacer.run(RecordingRenderer::default(), CancellationToken::new(), finished).await;
        assert_eq!(renderer.presented, vec![1]);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeats_at_cadence_until_cancelled() {
        let (cache, profile) = low_end();
        let period = profile.frame_period();
        let pacer = Pacer::new(cache.clone(), &profile);
        let cancel = CancellationToken::new();

        cache.push(video_frame(1, 0, 64, 64)).unwrap();
        let run = pacer.run(RecordingRenderer::default(), cancel.clone(), CancellationToken::new());
        let task = tokio::spawn(run);

        // Ticks at 0, p, 2p, 3p.
        tokio::time::sleep(period * 3 + period / 2).await;
        cancel.cancel();
        let renderer = task.await.unwrap();

        assert_eq!(renderer.presented, vec![1]);
        assert_eq!(renderer.repeats, 3);
        assert_eq!(cache.stats().snapshot().missed_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn presentation_interval_tracks_cadence() {
        let (cache, profile) = low_end();
        let period = profile.frame_period();
        let mut pacer = Pacer::new(cache.clone(), &profile);
        let mut renderer = RecordingRenderer::default();

        for sequence in 0..4u64 {
            cache.push(video_frame(sequence, sequence * 50, 64, 64)).unwrap();
            assert_eq!(pacer.tick(&mut renderer), TickOutcome::Presented { sequence });
            tokio::time::advance(period).await;
        }
        // Repeats are not presentations and leave the interval alone.
        assert_eq!(pacer.tick(&mut renderer), TickOutcome::Repeated);

        let stats = cache.stats().snapshot();
        assert_eq!(cache.stats().present_interval.samples(), 3);
        assert_eq!(stats.present_interval_recent_us, period.as_micros() as u64);
        assert!((stats.current_fps() - profile.target_fps() as f64).abs() < 0.01);
    }
}
