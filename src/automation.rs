//! Time-driven parameter animation.
//!
//! Elapsed time advances by a fixed step per tick regardless of wall-clock
//! drift, so a given tick count always yields the same parameter curve.

use crate::params::{UI_INTENSITY_MAX, UI_STRETCH_MAX, UiParams};

/// Shape of the stretch target curve. Both shapes are rate limited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StretchWave {
    /// `(sin(t * speed * 1.5) + 1) / 2`, starts mid-range.
    #[default]
    Sine,
    /// `(1 - cos(t * speed * 1.5)) / 2`, starts at zero.
    Cosine,
}

impl StretchWave {
    /// Stretch target in UI units, `[0, 200]`.
    pub fn target(self, elapsed: f64, speed: f64) -> f64 {
        let phase = elapsed * speed * 1.5;
        let unit = match self {
            Self::Sine => (phase.sin() + 1.0) / 2.0,
            Self::Cosine => (1.0 - phase.cos()) / 2.0,
        };
        (unit * f64::from(UI_STRETCH_MAX)).round()
    }
}

/// Normalized intensity in `[0.2, 1.0]`.
pub fn automated_intensity(elapsed: f64, speed: f64) -> f64 {
    (elapsed * speed * 2.0).sin().abs() * 0.8 + 0.2
}

/// Which parameters the automator drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AutomationOptions {
    pub intensity: bool,
    pub stretch: bool,
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            intensity: true,
            stretch: true,
        }
    }
}

impl AutomationOptions {
    pub fn from_ui(ui: &UiParams) -> Self {
        Self {
            intensity: ui.auto_intensity,
            stretch: ui.auto_stretch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutomationPhase {
    Idle,
    Automating,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AutomationState {
    pub enabled: bool,
    pub auto_speed: f64,
    pub elapsed: f64,
    pub last_applied_stretch: f64,
}

/// Values written back to the controls by one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationTick {
    pub elapsed: f64,
    pub intensity: Option<u32>,
    pub stretch: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Automator {
    state: AutomationState,
    options: AutomationOptions,
    step_secs: f64,
    max_stretch_step: f64,
    wave: StretchWave,
}

impl Automator {
    pub fn new(step_secs: f64, max_stretch_step: f64, wave: StretchWave) -> Self {
        Self {
            state: AutomationState::default(),
            options: AutomationOptions::default(),
            step_secs,
            max_stretch_step,
            wave,
        }
    }

    pub fn phase(&self) -> AutomationPhase {
        if self.state.enabled {
            AutomationPhase::Automating
        } else {
            AutomationPhase::Idle
        }
    }

    pub fn state(&self) -> &AutomationState {
        &self.state
    }

    pub fn options(&self) -> AutomationOptions {
        self.options
    }

    pub fn set_options(&mut self, options: AutomationOptions) {
        self.options = options;
    }

    /// Idle -> Automating. Restarts elapsed time from zero and seeds the rate
    /// limiter with the stretch value currently on the controls.
    pub fn enable(&mut self, options: AutomationOptions, current_stretch: u32) {
        self.options = options;
        self.state = AutomationState {
            enabled: true,
            auto_speed: self.state.auto_speed,
            elapsed: 0.0,
            last_applied_stretch: f64::from(current_stretch),
        };
    }

    /// Automating -> Idle. Returns `false` when already idle.
    pub fn disable(&mut self) -> bool {
        std::mem::replace(&mut self.state.enabled, false)
    }

    pub fn reset(&mut self) {
        self.state = AutomationState::default();
    }

    /// Advances one step and writes the animated values into `ui`.
    ///
    /// The stretch value moves toward its target by at most the configured
    /// step, measured from the value currently on the controls. Returns `None`
    /// while idle.
    pub fn tick(&mut self, ui: &mut UiParams) -> Option<AutomationTick> {
        if !self.state.enabled {
            return None;
        }

        let speed = ui.auto_speed_factor();
        self.state.auto_speed = speed;
        self.state.elapsed += self.step_secs;
        let t = self.state.elapsed;

        let intensity = self.options.intensity.then(|| {
            let v = (automated_intensity(t, speed) * f64::from(UI_INTENSITY_MAX)).round() as u32;
            ui.intensity = v.min(UI_INTENSITY_MAX);
            ui.intensity
        });

        let stretch = self.options.stretch.then(|| {
            let current = f64::from(ui.stretch.min(UI_STRETCH_MAX));
            let target = self.wave.target(t, speed);
            let delta = (target - current)
                .clamp(-self.max_stretch_step, self.max_stretch_step)
                .trunc();
            let next = (current + delta).clamp(0.0, f64::from(UI_STRETCH_MAX));
            self.state.last_applied_stretch = next;
            ui.stretch = next as u32;
            ui.stretch
        });

        Some(AutomationTick {
            elapsed: t,
            intensity,
            stretch,
        })
    }
}
