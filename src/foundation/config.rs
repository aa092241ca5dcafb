use std::{path::Path, time::Duration};

use anyhow::Context as _;

use crate::{
    automation::StretchWave,
    foundation::error::{FxError, FxResult},
    params::ResponseCurve,
};

/// Engine-wide tuning knobs. Every field has a default, so a config file only
/// needs to name what it overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on preview renders per second.
    pub preview_max_hz: f64,
    /// Upper bound on automation ticks per second.
    pub automation_max_hz: f64,
    /// Sampling rate of the recording loop.
    pub recording_fps: f64,
    /// Fixed elapsed-time increment per automation tick, in seconds.
    pub automation_step_secs: f64,
    pub preview_max_stretch_step: f64,
    pub recording_max_stretch_step: f64,
    pub stretch_curve: ResponseCurve,
    pub stretch_wave: StretchWave,
    pub source_retry_delay_ms: u64,
    pub workers: WorkerConfig,
    /// Seed for the effect random source; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_workers: 4,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_max_hz: 120.0,
            automation_max_hz: 60.0,
            recording_fps: 30.0,
            automation_step_secs: 0.016,
            preview_max_stretch_step: 3.0,
            recording_max_stretch_step: 5.0,
            stretch_curve: ResponseCurve::default(),
            stretch_wave: StretchWave::default(),
            source_retry_delay_ms: 100,
            workers: WorkerConfig::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> FxResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| FxError::serde(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> FxResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read engine config '{}'", path.display()))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> FxResult<()> {
        for (name, hz) in [
            ("preview_max_hz", self.preview_max_hz),
            ("automation_max_hz", self.automation_max_hz),
            ("recording_fps", self.recording_fps),
        ] {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(FxError::validation(format!(
                    "{name} must be finite and > 0"
                )));
            }
        }
        if !self.automation_step_secs.is_finite() || self.automation_step_secs <= 0.0 {
            return Err(FxError::validation(
                "automation_step_secs must be finite and > 0",
            ));
        }
        for (name, step) in [
            ("preview_max_stretch_step", self.preview_max_stretch_step),
            ("recording_max_stretch_step", self.recording_max_stretch_step),
        ] {
            if !step.is_finite() || step < 1.0 {
                return Err(FxError::validation(format!(
                    "{name} must be finite and >= 1"
                )));
            }
        }
        self.stretch_curve.validate()?;
        if self.workers.enabled && self.workers.max_workers == 0 {
            return Err(FxError::validation(
                "workers.max_workers must be >= 1 when workers are enabled",
            ));
        }
        Ok(())
    }

    pub fn preview_interval(&self) -> Duration {
        hz_to_interval(self.preview_max_hz)
    }

    pub fn automation_interval(&self) -> Duration {
        hz_to_interval(self.automation_max_hz)
    }

    pub fn recording_interval(&self) -> Duration {
        hz_to_interval(self.recording_fps)
    }

    pub fn source_retry_delay(&self) -> Duration {
        Duration::from_millis(self.source_retry_delay_ms)
    }
}

/// Period of a loop running at `hz`.
pub(crate) fn hz_to_interval(hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / hz)
}
