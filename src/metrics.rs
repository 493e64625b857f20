//! Per-stream diagnostics counters
//!
//! Every non-fatal error and every dropped packet or frame increments one of
//! these counters, so nothing the pipeline discards goes unobserved.
//! Counters are relaxed atomics: writers never block and readers get a
//! consistent-enough snapshot for monitoring.
//!
//! Decode time and the interval between presentations are tracked as
//! [`Timing`]s: a lifetime average plus the average of the last
//! [`RECENT_WINDOW`] samples, from which the snapshot derives the current
//! frame rate.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Samples kept for recent averages
pub const RECENT_WINDOW: usize = 30;

/// Monotonic relaxed counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Duration samples: lifetime total plus a sliding window
#[derive(Debug, Default)]
pub struct Timing {
    total_ns: Counter,
    samples: Counter,
    recent: Mutex<VecDeque<u64>>,
}

impl Timing {
    pub fn record(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_ns.add(ns);
        self.samples.inc();

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == RECENT_WINDOW {
            recent.pop_front();
        }
        recent.push_back(ns);
    }

    pub fn samples(&self) -> u64 {
        self.samples.get()
    }

    /// Mean over every sample since creation or the last reset
    pub fn average(&self) -> Duration {
        let samples = self.samples.get();
        if samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_ns.get() / samples)
    }

    /// Mean over the last [`RECENT_WINDOW`] samples
    pub fn recent_average(&self) -> Duration {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_nanos(recent.iter().sum::<u64>() / recent.len() as u64)
    }

    pub fn reset(&self) {
        self.total_ns.reset();
        self.samples.reset();
        self.recent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Live counters for one stream pipeline
#[derive(Debug, Default)]
pub struct StreamStats {
    // Receiver
    pub packets_received: Counter,
    pub sequence_gaps: Counter,
    pub packets_lost: Counter,
    pub packets_stale: Counter,
    pub transient_retries: Counter,

    // Decoder
    pub frames_decoded: Counter,
    pub decode_errors: Counter,
    pub decoder_reinits: Counter,

    // Cache
    pub cache_evictions: Counter,
    pub capability_rejections: Counter,
    pub stale_rejections: Counter,
    pub frames_skipped: Counter,

    // Pacer
    pub frames_presented: Counter,
    pub frames_repeated: Counter,
    pub drift_events: Counter,
    pub missed_ticks: Counter,

    // Audio
    pub audio_delivered: Counter,
    pub audio_dropped: Counter,

    // Timing
    pub decode_time: Timing,
    pub present_interval: Timing,
}

impl StreamStats {
    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received.get(),
            sequence_gaps: self.sequence_gaps.get(),
            packets_lost: self.packets_lost.get(),
            packets_stale: self.packets_stale.get(),
            transient_retries: self.transient_retries.get(),
            frames_decoded: self.frames_decoded.get(),
            decode_errors: self.decode_errors.get(),
            decoder_reinits: self.decoder_reinits.get(),
            cache_evictions: self.cache_evictions.get(),
            capability_rejections: self.capability_rejections.get(),
            stale_rejections: self.stale_rejections.get(),
            frames_skipped: self.frames_skipped.get(),
            frames_presented: self.frames_presented.get(),
            frames_repeated: self.frames_repeated.get(),
            drift_events: self.drift_events.get(),
            missed_ticks: self.missed_ticks.get(),
            audio_delivered: self.audio_delivered.get(),
            audio_dropped: self.audio_dropped.get(),
            decode_samples: self.decode_time.samples(),
            decode_avg_us: micros(self.decode_time.average()),
            decode_recent_us: micros(self.decode_time.recent_average()),
            present_interval_avg_us: micros(self.present_interval.average()),
            present_interval_recent_us: micros(self.present_interval.recent_average()),
        }
    }

    /// Zero every counter and timing window
    pub fn reset(&self) {
        for counter in [
            &self.packets_received,
            &self.sequence_gaps,
            &self.packets_lost,
            &self.packets_stale,
            &self.transient_retries,
            &self.frames_decoded,
            &self.decode_errors,
            &self.decoder_reinits,
            &self.cache_evictions,
            &self.capability_rejections,
            &self.stale_rejections,
            &self.frames_skipped,
            &self.frames_presented,
            &self.frames_repeated,
            &self.drift_events,
            &self.missed_ticks,
            &self.audio_delivered,
            &self.audio_dropped,
        ] {
            counter.reset();
        }
        self.decode_time.reset();
        self.present_interval.reset();
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Plain-value copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub sequence_gaps: u64,
    pub packets_lost: u64,
    pub packets_stale: u64,
    pub transient_retries: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub decoder_reinits: u64,
    pub cache_evictions: u64,
    pub capability_rejections: u64,
    pub stale_rejections: u64,
    pub frames_skipped: u64,
    pub frames_presented: u64,
    pub frames_repeated: u64,
    pub drift_events: u64,
    pub missed_ticks: u64,
    pub audio_delivered: u64,
    pub audio_dropped: u64,
    pub decode_samples: u64,
    pub decode_avg_us: u64,
    pub decode_recent_us: u64,
    pub present_interval_avg_us: u64,
    pub present_interval_recent_us: u64,
}

impl StatsSnapshot {
    /// Decoded frames that never reached the renderer
    pub fn frames_dropped(&self) -> u64 {
        self.cache_evictions + self.capability_rejections + self.stale_rejections
    }

    /// Dropped frames as a percentage of presented plus dropped
    pub fn drop_rate(&self) -> f64 {
        percentage(self.frames_dropped(), self.frames_presented + self.frames_dropped())
    }

    /// Catch-up skips as a percentage of presented plus skipped
    pub fn skip_rate(&self) -> f64 {
        percentage(self.frames_skipped, self.frames_presented + self.frames_skipped)
    }

    /// Presentation rate over the recent window; zero before two presentations
    pub fn current_fps(&self) -> f64 {
        if self.present_interval_recent_us == 0 {
            0.0
        } else {
            1_000_000.0 / self.present_interval_recent_us as f64
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 * 100.0 }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} decoded={} presented={} repeated={} dropped={} ({:.1}%) skipped={} ({:.1}%) \
             gaps={} decode_errors={} missed_ticks={} fps={:.1} decode_avg={}us",
            self.packets_received,
            self.frames_decoded,
            self.frames_presented,
            self.frames_repeated,
            self.frames_dropped(),
            self.drop_rate(),
            self.frames_skipped,
            self.skip_rate(),
            self.sequence_gaps,
            self.decode_errors,
            self.missed_ticks,
            self.current_fps(),
            self.decode_avg_us,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let stats = StreamStats::default();
        stats.packets_received.add(10);
        stats.frames_presented.add(6);
        stats.cache_evictions.add(2);
        stats.frames_skipped.add(2);

        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 10);
        assert_eq!(snap.frames_dropped(), 2);
        assert!((snap.drop_rate() - 25.0).abs() < f64::EPSILON);
        assert!((snap.skip_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_rates_are_zero() {
        let snap = StatsSnapshot::default();
        assert_eq!(snap.drop_rate(), 0.0);
        assert_eq!(snap.skip_rate(), 0.0);
        assert!(snap.to_string().contains("presented=0"));
        assert_eq!(snap.current_fps(), 0.0);
    }

    #[test]
    fn timing_tracks_lifetime_and_recent_averages() {
        let timing = Timing::default();
        for _ in 0..RECENT_WINDOW {
            timing.record(Duration::from_millis(10));
        }
        for _ in 0..RECENT_WINDOW {
            timing.record(Duration::from_millis(30));
        }

        assert_eq!(timing.samples(), 2 * RECENT_WINDOW as u64);
        assert_eq!(timing.average(), Duration::from_millis(20));
        assert_eq!(timing.recent_average(), Duration::from_millis(30), "old samples leave the window");
    }

    #[test]
    fn fps_follows_recent_presentation_interval() {
        let stats = StreamStats::default();
        for _ in 0..5 {
            stats.present_interval.record(Duration::from_millis(50));
        }
        stats.decode_time.record(Duration::from_micros(1500));

        let snap = stats.snapshot();
        assert!((snap.current_fps() - 20.0).abs() < 1e-9);
        assert_eq!(snap.present_interval_avg_us, 50_000);
        assert_eq!(snap.decode_avg_us, 1500);
        assert_eq!(snap.decode_samples, 1);
        assert!(snap.to_string().contains("fps=20.0"));
    }

    #[test]
    fn reset_zeroes_counters_and_windows() {
        let stats = StreamStats::default();
        stats.packets_received.add(7);
        stats.missed_ticks.add(2);
        stats.decode_time.record(Duration::from_millis(4));
        stats.present_interval.record(Duration::from_millis(33));

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.present_interval.recent_average(), Duration::ZERO);

        stats.present_interval.record(Duration::from_millis(40));
        assert_eq!(stats.snapshot().present_interval_recent_us, 40_000);
    }
}
