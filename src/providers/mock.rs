//! Mock packet source for staging builds and tests.
//!
//! Two modes share the [`PacketSource`] contract with the network receiver:
//!
//! - **Scripted**: replays an ordered [`MockScript`] of packets, transient
//!   errors and an end marker
//! - **Synthetic**: generates a deterministic colour-bar pattern, optionally
//!   with one audio packet per video frame
//!
//! Either mode can refuse its first K connect attempts to exercise retry.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::source::PacketSource;
use crate::types::{
    CodecKind, EncodedPacket, MediaFlags, PacketFormat, Resolution, SourceDescriptor, StreamHandle, StreamId,
};
use crate::wire::StreamHeader;
use crate::{PipelineError, Result};

/// Sample rate of synthetic audio
pub const SYNTHETIC_SAMPLE_RATE: u32 = 48_000;

/// Channel count of synthetic audio
pub const SYNTHETIC_CHANNELS: u16 = 2;

/// One step of a scripted stream
#[derive(Debug, Clone)]
pub enum MockStep {
    Packet { sequence: u64, capture_time: Duration, format: PacketFormat, payload: Vec<u8> },
    /// A read timeout the caller should retry
    TransientError,
    /// Clean end of stream
    End,
}

/// Ordered list of steps replayed by [`MockSource::scripted`]
#[derive(Debug, Clone)]
pub struct MockScript {
    resolution: Resolution,
    codec: CodecKind,
    media: MediaFlags,
    steps: Vec<MockStep>,
}

impl MockScript {
    /// Empty script negotiating `resolution` and `codec` on connect
    pub fn new(resolution: Resolution, codec: CodecKind) -> Self {
        Self { resolution, codec, media: MediaFlags::VIDEO_ONLY, steps: Vec::new() }
    }

    /// Append a video packet in the negotiated format
    pub fn video(self, sequence: u64, capture_time: Duration, payload: Vec<u8>) -> Self {
        let format = PacketFormat::Video { resolution: self.resolution, codec: self.codec };
        self.step(MockStep::Packet { sequence, capture_time, format, payload })
    }

    /// Append a video packet in an explicit format
    pub fn video_as(
        self,
        sequence: u64,
        capture_time: Duration,
        resolution: Resolution,
        codec: CodecKind,
        payload: Vec<u8>,
    ) -> Self {
        let format = PacketFormat::Video { resolution, codec };
        self.step(MockStep::Packet { sequence, capture_time, format, payload })
    }

    /// Append an audio packet of interleaved samples
    pub fn audio(
        mut self,
        sequence: u64,
        capture_time: Duration,
        channels: u16,
        sample_rate: u32,
        samples: &[f32],
    ) -> Self {
        self.media.audio = true;
        let payload = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let format = PacketFormat::Audio { channels, sample_rate };
        self.step(MockStep::Packet { sequence, capture_time, format, payload })
    }

    pub fn transient_error(self) -> Self {
        self.step(MockStep::TransientError)
    }

    /// Append an explicit end marker; steps after it are never reached
    pub fn end(self) -> Self {
        self.step(MockStep::End)
    }

    pub fn step(mut self, step: MockStep) -> Self {
        self.steps.push(step);
        self
    }

    /// `count` consecutive test-pattern frames at `fps`, starting at sequence 0
    pub fn pattern(resolution: Resolution, codec: CodecKind, count: u64, fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        (0..count).fold(Self::new(resolution, codec), |script, i| {
            script.video(i, frame_pts(period, i), test_pattern(resolution, codec, i))
        })
    }

    pub fn steps(&self) -> &[MockStep] {
        &self.steps
    }

    /// Header a network source would send for this script
    pub fn stream_header(&self) -> StreamHeader {
        StreamHeader { codec: self.codec, resolution: self.resolution, media: self.media }
    }

    /// The packets this script delivers, in order, up to the first end marker
    pub fn packets(&self, stream_id: StreamId) -> Vec<EncodedPacket> {
        self.steps
            .iter()
            .take_while(|step| !matches!(step, MockStep::End))
            .filter_map(|step| match step {
                MockStep::Packet { sequence, capture_time, format, payload } => {
                    Some(EncodedPacket::new(stream_id, *sequence, *capture_time, *format, payload.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Parameters of the synthetic generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyntheticConfig {
    pub resolution: Resolution,
    pub codec: CodecKind,

    /// Nominal frame rate; sets capture timestamps and pacing
    pub fps: u32,

    /// Number of video frames to emit; `None` runs until cancelled
    #[serde(default)]
    pub frames: Option<u64>,

    /// Emit one audio packet after every video frame
    #[serde(default)]
    pub audio: bool,

    /// Release packets in real time instead of as fast as they are pulled
    #[serde(default = "default_paced")]
    pub paced: bool,
}

fn default_paced() -> bool {
    true
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(1280, 720),
            codec: CodecKind::Uyvy,
            fps: 30,
            frames: None,
            audio: false,
            paced: true,
        }
    }
}

impl SyntheticConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

#[derive(Debug)]
enum Mode {
    Scripted { script: MockScript, cursor: usize },
    Synthetic { config: SyntheticConfig, frame: u64, sequence: u64, audio_due: bool },
}

/// In-process packet source
pub struct MockSource {
    mode: Mode,
    fail_connects: u32,
    connect_attempts: u32,
    stream: Option<StreamId>,
    pacing: Option<Duration>,
    interval: Option<Interval>,
}

impl MockSource {
    /// Replay `script` step by step
    pub fn scripted(script: MockScript) -> Self {
        Self::with_mode(Mode::Scripted { script, cursor: 0 }, None)
    }

    /// Generate a colour-bar stream
    pub fn synthetic(config: SyntheticConfig) -> Self {
        let pacing = config.paced.then(|| config.frame_period());
        Self::with_mode(Mode::Synthetic { config, frame: 0, sequence: 0, audio_due: false }, pacing)
    }

    fn with_mode(mode: Mode, pacing: Option<Duration>) -> Self {
        Self { mode, fail_connects: 0, connect_attempts: 0, stream: None, pacing, interval: None }
    }

    /// Refuse the first `attempts` connects with `SourceUnavailable`
    pub fn fail_connects(mut self, attempts: u32) -> Self {
        self.fail_connects = attempts;
        self
    }

    /// Release at most one video packet per `period`
    pub fn paced(mut self, period: Duration) -> Self {
        self.pacing = Some(period);
        self
    }

    /// Connect calls seen so far, successful or not
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    fn negotiated(&self) -> (Resolution, CodecKind, MediaFlags) {
        match &self.mode {
            Mode::Scripted { script, .. } => (script.resolution, script.codec, script.media),
            Mode::Synthetic { config, .. } => {
                let media = if config.audio { MediaFlags::AUDIO_VIDEO } else { MediaFlags::VIDEO_ONLY };
                (config.resolution, config.codec, media)
            }
        }
    }

    async fn pace(&mut self, handle: &StreamHandle) -> Result<()> {
        let Some(interval) = self.interval.as_mut() else {
            return Ok(());
        };
        let cancel = handle.token();
        tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::StreamEnded { stream_id: handle.id().0 }),
            _ = interval.tick() => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl PacketSource for MockSource {
    async fn connect(&mut self, descriptor: &SourceDescriptor) -> Result<StreamHandle> {
        self.connect_attempts += 1;
        if self.connect_attempts <= self.fail_connects {
            debug!(source = %descriptor, attempt = self.connect_attempts, "Mock source refusing connect");
            return Err(PipelineError::source_unavailable(
                descriptor.name.clone(),
                1,
                "mock source refused connection",
            ));
        }

        match &mut self.mode {
            Mode::Scripted { cursor, .. } => *cursor = 0,
            Mode::Synthetic { frame, sequence, audio_due, .. } => {
                *frame = 0;
                *sequence = 0;
                *audio_due = false;
            }
        }

        let (resolution, codec, media) = self.negotiated();
        let handle = StreamHandle::new(descriptor.clone(), resolution, codec, media);
        self.stream = Some(handle.id());
        self.interval = self.pacing.map(|period| {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(stream = %handle.id(), source = %descriptor, %resolution, %codec, "Mock source connected");
        Ok(handle)
    }

    async fn next_packet(&mut self, handle: &StreamHandle) -> Result<EncodedPacket> {
        let stream_id = handle.id();
        if handle.is_cancelled() {
            return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
        }
        if self.stream != Some(stream_id) {
            return Err(PipelineError::protocol("next_packet", format!("stream {} is not connected", stream_id)));
        }

        let next_is_video = match &self.mode {
            Mode::Scripted { script, cursor } => matches!(
                script.steps.get(*cursor),
                Some(MockStep::Packet { format: PacketFormat::Video { .. }, .. })
            ),
            Mode::Synthetic { audio_due, .. } => !*audio_due,
        };
        if next_is_video {
            self.pace(handle).await?;
        }

        match &mut self.mode {
            Mode::Scripted { script, cursor } => {
                let Some(step) = script.steps.get(*cursor) else {
                    return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
                };
                match step {
                    MockStep::End => Err(PipelineError::StreamEnded { stream_id: stream_id.0 }),
                    MockStep::TransientError => {
                        *cursor += 1;
                        Err(PipelineError::transient_io(
                            "waiting for packet header",
                            std::io::Error::new(std::io::ErrorKind::TimedOut, "scripted timeout"),
                        ))
                    }
                    MockStep::Packet { sequence, capture_time, format, payload } => {
                        let packet =
                            EncodedPacket::new(stream_id, *sequence, *capture_time, *format, payload.clone());
                        *cursor += 1;
                        trace!(stream = %stream_id, sequence = packet.sequence, "Mock packet");
                        Ok(packet)
                    }
                }
            }
            Mode::Synthetic { config, frame, sequence, audio_due } => {
                let pts = frame_pts(config.frame_period(), *frame);
                let packet = if *audio_due {
                    // Audio shares the pts of the video frame just emitted.
                    let payload = tone(config.fps, *frame).iter().flat_map(|s| s.to_le_bytes()).collect();
                    let format =
                        PacketFormat::Audio { channels: SYNTHETIC_CHANNELS, sample_rate: SYNTHETIC_SAMPLE_RATE };
                    *audio_due = false;
                    *frame += 1;
                    EncodedPacket::new(stream_id, *sequence, pts, format, payload)
                } else {
                    if config.frames.is_some_and(|total| *frame >= total) {
                        return Err(PipelineError::StreamEnded { stream_id: stream_id.0 });
                    }
                    let format = PacketFormat::Video { resolution: config.resolution, codec: config.codec };
                    let payload = test_pattern(config.resolution, config.codec, *frame);
                    if config.audio {
                        *audio_due = true;
                    } else {
                        *frame += 1;
                    }
                    EncodedPacket::new(stream_id, *sequence, pts, format, payload)
                };
                *sequence += 1;
                Ok(packet)
            }
        }
    }
}

/// Capture time of frame `frame` at a fixed period, saturating at the end of time
fn frame_pts(period: Duration, frame: u64) -> Duration {
    let nanos = period.as_nanos().saturating_mul(frame as u128);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// 100% colour bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS_RGB: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// The same bars in studio-range BT.601 (Y, U, V)
const BARS_YUV: [[u8; 3]; 8] = [
    [235, 128, 128],
    [210, 16, 146],
    [170, 166, 16],
    [145, 54, 34],
    [106, 202, 222],
    [81, 90, 240],
    [41, 240, 110],
    [16, 128, 128],
];

/// Deterministic colour-bar frame; bars scroll by one position per frame.
///
/// Returns an empty buffer for audio codecs.
pub fn test_pattern(resolution: Resolution, codec: CodecKind, frame: u64) -> Vec<u8> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    if width == 0 || !codec.is_video() {
        return Vec::new();
    }
    let shift = (frame % 8) as usize;
    let bar = |x: usize| (x * 8 / width + shift) % 8;

    let mut row = Vec::with_capacity(width * codec.bytes_per_unit());
    match codec {
        CodecKind::Uyvy => {
            for x in (0..width).step_by(2) {
                let [y, u, v] = BARS_YUV[bar(x)];
                row.extend_from_slice(&[u, y, v, y]);
            }
        }
        _ => {
            for x in 0..width {
                let [r, g, b] = BARS_RGB[bar(x)];
                let px = match codec {
                    CodecKind::Bgra => [b, g, r, 0xFF],
                    CodecKind::Bgrx => [b, g, r, 0x00],
                    CodecKind::Rgba => [r, g, b, 0xFF],
                    _ => [r, g, b, 0x00],
                };
                row.extend_from_slice(&px);
            }
        }
    }
    row.repeat(height)
}

/// One frame's worth of a 440 Hz stereo tone
fn tone(fps: u32, frame: u64) -> Vec<f32> {
    let per_frame = (SYNTHETIC_SAMPLE_RATE / fps.max(1)) as u64;
    let start = frame * per_frame;
    let step = 2.0 * std::f32::consts::PI * 440.0 / SYNTHETIC_SAMPLE_RATE as f32;
    (start..start + per_frame)
        .flat_map(|n| {
            let s = 0.25 * (step * (n % SYNTHETIC_SAMPLE_RATE as u64) as f32).sin();
            [s; SYNTHETIC_CHANNELS as usize]
        })
        .collect()
}
