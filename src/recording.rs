use std::time::Duration;

use crate::{
    foundation::{
        config::hz_to_interval,
        core::PixelBuffer,
        error::{FxError, FxResult},
    },
    schedule::RateGate,
};

/// How long a recording runs.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingTarget {
    /// Fixed length, for stills and cameras.
    Seconds(f64),
    /// The source's natural playback length; the source is rewound first.
    SourceDuration,
}

impl RecordingTarget {
    pub fn resolve(self, source_duration: Option<Duration>) -> FxResult<f64> {
        let secs = match self {
            Self::Seconds(s) => s,
            Self::SourceDuration => source_duration
                .ok_or_else(|| {
                    FxError::validation("source has no natural duration to record against")
                })?
                .as_secs_f64(),
        };
        if !secs.is_finite() || secs <= 0.0 {
            return Err(FxError::validation(format!(
                "recording duration must be finite and > 0, got {secs}"
            )));
        }
        Ok(secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFrame {
    pub buffer: PixelBuffer,
    /// Seconds since recording start.
    pub timestamp: Duration,
}

/// Sidecar written next to exported image sequences.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub frame_count: usize,
    pub duration: f64,
    pub fps: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

/// A finished, ordered capture ready for export.
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    pub frames: Vec<RecordedFrame>,
    pub fps: f64,
    pub target_secs: f64,
}

impl Recording {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames
            .first()
            .map(|f| (f.buffer.width, f.buffer.height))
    }

    /// Timestamp of the last frame, in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames
            .last()
            .map_or(0.0, |f| f.timestamp.as_secs_f64())
    }

    pub fn metadata(&self) -> RecordingMetadata {
        let (canvas_width, canvas_height) = self.dimensions().unwrap_or((0, 0));
        RecordingMetadata {
            frame_count: self.frames.len(),
            duration: self.duration_secs(),
            fps: self.fps,
            canvas_width,
            canvas_height,
        }
    }
}

/// Samples presented output at a fixed rate for a bounded duration.
#[derive(Clone, Debug)]
pub struct RecordingSession {
    active: bool,
    start: Duration,
    target_secs: f64,
    fps: f64,
    gate: RateGate,
    frames: Vec<RecordedFrame>,
}

impl RecordingSession {
    pub fn new(start: Duration, target_secs: f64, fps: f64) -> Self {
        Self {
            active: true,
            start,
            target_secs,
            fps,
            gate: RateGate::new(hz_to_interval(fps)),
            frames: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target_secs(&self) -> f64 {
        self.target_secs
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.start)
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        self.elapsed(now).as_secs_f64() >= self.target_secs
    }

    /// Fraction of the target duration covered, in `[0, 1]`.
    pub fn progress(&self, now: Duration) -> f64 {
        (self.elapsed(now).as_secs_f64() / self.target_secs).clamp(0.0, 1.0)
    }

    /// Stores `frame` if the session is active, not yet complete and its rate
    /// gate allows. Returns whether a frame was stored.
    pub fn sample(&mut self, now: Duration, frame: &PixelBuffer) -> bool {
        if !self.active || self.is_complete(now) || !self.gate.try_fire(now) {
            return false;
        }
        self.frames.push(RecordedFrame {
            buffer: frame.clone(),
            timestamp: self.elapsed(now),
        });
        true
    }

    /// Returns `false` if the session was already stopped.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    pub fn finish(mut self) -> Recording {
        self.active = false;
        Recording {
            frames: self.frames,
            fps: self.fps,
            target_secs: self.target_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::{config::EngineConfig, core::Rgba};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn target_resolution() {
        assert_eq!(RecordingTarget::Seconds(3.0).resolve(None).unwrap(), 3.0);
        assert_eq!(
            RecordingTarget::SourceDuration
                .resolve(Some(Duration::from_secs(2)))
                .unwrap(),
            2.0
        );
        assert!(RecordingTarget::SourceDuration.resolve(None).is_err());
        assert!(RecordingTarget::Seconds(0.0).resolve(None).is_err());
    }

    #[test]
    fn samples_at_rate_with_relative_timestamps() {
        let frame = PixelBuffer::filled(2, 2, Rgba::WHITE).unwrap();
        let mut s = RecordingSession::new(ms(1000), 1.0, 30.0);
        assert!(s.sample(ms(1000), &frame));
        assert!(!s.sample(ms(1010), &frame));
        assert!(s.sample(ms(1034), &frame));
        assert!(!s.sample(ms(2000), &frame), "past target");
        let rec = s.finish();
        assert_eq!(rec.frames.len(), 2);
        assert_eq!(rec.frames[0].timestamp, Duration::ZERO);
        assert_eq!(rec.frames[1].timestamp, ms(34));
    }

    #[test]
    fn sampling_period_matches_configured_recording_interval() {
        let cfg = EngineConfig::default();
        let s = RecordingSession::new(Duration::ZERO, 1.0, cfg.recording_fps);
        assert_eq!(s.gate.interval(), cfg.recording_interval());
    }

    #[test]
    fn stop_is_idempotent_and_blocks_sampling() {
        let frame = PixelBuffer::filled(1, 1, Rgba::BLACK).unwrap();
        let mut s = RecordingSession::new(Duration::ZERO, 5.0, 30.0);
        assert!(s.stop());
        assert!(!s.stop());
        assert!(!s.sample(ms(100), &frame));
    }

    #[test]
    fn metadata_uses_camel_case_keys() {
        let frame = PixelBuffer::filled(4, 2, Rgba::BLACK).unwrap();
        let mut s = RecordingSession::new(Duration::ZERO, 5.0, 30.0);
        s.sample(Duration::ZERO, &frame);
        s.sample(ms(500), &frame);
        let meta = s.finish().metadata();
        assert_eq!(meta.frame_count, 2);
        assert_eq!(meta.duration, 0.5);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["canvasWidth"], 4);
        assert_eq!(json["frameCount"], 2);
    }
}
