use std::{fmt, str::FromStr};

use crate::foundation::error::{FxError, FxResult};

/// UI-facing maximum for the intensity slider.
pub const UI_INTENSITY_MAX: u32 = 100;
/// UI-facing maximum for the stretch slider.
pub const UI_STRETCH_MAX: u32 = 200;
/// UI-facing maximum for the automation speed slider.
pub const UI_AUTO_SPEED_MAX: u32 = 100;

macro_rules! tagged_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $tag:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = FxError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        FxError::validation(format!(
                            "unknown {} '{s}' (expected one of: {})",
                            stringify!($name),
                            Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                        ))
                    })
            }
        }
    };
}

tagged_enum! {
    pub enum EffectKind {
        #[default]
        SlitScan => "slit-scan",
        PixelSort => "pixel-sort",
        Glitch => "glitch",
        Combined => "combined",
    }
}

tagged_enum! {
    /// Slicing / remap geometry. Not every effect implements every direction.
    pub enum Direction {
        #[default]
        Vertical => "vertical",
        Horizontal => "horizontal",
        Radial => "radial",
        Wave => "wave",
        Spiral => "spiral",
    }
}

tagged_enum! {
    /// Spatial response used to derive the per-pixel stretch factor.
    pub enum StretchKind {
        #[default]
        Uniform => "uniform",
        Gradient => "gradient",
        Random => "random",
        Center => "center",
        Edges => "edges",
    }
}

/// Maps the stretch slider to a normalized amount in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResponseCurve {
    Linear,
    Power { exponent: f64 },
}

impl Default for ResponseCurve {
    fn default() -> Self {
        Self::Power { exponent: 1.5 }
    }
}

impl ResponseCurve {
    pub fn validate(&self) -> FxResult<()> {
        if let Self::Power { exponent } = *self
            && (!exponent.is_finite() || exponent <= 0.0)
        {
            return Err(FxError::validation(
                "stretch curve exponent must be finite and > 0",
            ));
        }
        Ok(())
    }

    /// `ui` is a slider value in `[0, UI_STRETCH_MAX]`; out-of-range input is clamped.
    pub fn normalize(&self, ui: f64) -> f64 {
        let t = if ui.is_finite() {
            (ui / f64::from(UI_STRETCH_MAX)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        match *self {
            Self::Linear => t,
            Self::Power { exponent } => t.powf(exponent),
        }
    }
}

/// Raw control-surface values, in UI units.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UiParams {
    pub effect: EffectKind,
    pub direction: Direction,
    pub stretch_kind: StretchKind,
    /// 0..=100
    pub intensity: u32,
    /// 0..=200
    pub stretch: u32,
    /// 0..=100, divided by 100 before use.
    pub auto_speed: u32,
    pub recording_seconds: f64,
    pub auto_intensity: bool,
    pub auto_stretch: bool,
}

impl Default for UiParams {
    fn default() -> Self {
        Self {
            effect: EffectKind::default(),
            direction: Direction::default(),
            stretch_kind: StretchKind::default(),
            intensity: 50,
            stretch: 0,
            auto_speed: 50,
            recording_seconds: 5.0,
            auto_intensity: true,
            auto_stretch: true,
        }
    }
}

impl UiParams {
    /// Slider values forced into their declared ranges.
    pub fn clamped(mut self) -> Self {
        self.intensity = self.intensity.min(UI_INTENSITY_MAX);
        self.stretch = self.stretch.min(UI_STRETCH_MAX);
        self.auto_speed = self.auto_speed.min(UI_AUTO_SPEED_MAX);
        if !self.recording_seconds.is_finite() || self.recording_seconds < 0.0 {
            self.recording_seconds = 0.0;
        }
        self
    }

    pub fn auto_speed_factor(&self) -> f64 {
        f64::from(self.auto_speed.min(UI_AUTO_SPEED_MAX)) / 100.0
    }
}

/// Read accessor for whatever surface owns the controls. Polled once per tick.
pub trait ParameterSource {
    fn current(&self) -> UiParams;
}

impl ParameterSource for UiParams {
    fn current(&self) -> UiParams {
        self.clone()
    }
}

impl<T: ParameterSource + ?Sized> ParameterSource for std::sync::Arc<std::sync::Mutex<T>> {
    fn current(&self) -> UiParams {
        match self.lock() {
            Ok(guard) => guard.current(),
            Err(poisoned) => poisoned.into_inner().current(),
        }
    }
}

/// Parameter set consumed by the effect algorithms.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectParameters {
    pub effect: EffectKind,
    /// `[0, 1]`
    pub intensity: f64,
    pub direction: Direction,
    pub stretch_kind: StretchKind,
    /// `[0, 1]`, already passed through the response curve.
    pub stretch_amount: f64,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            effect: EffectKind::default(),
            intensity: 0.0,
            direction: Direction::default(),
            stretch_kind: StretchKind::default(),
            stretch_amount: 0.0,
        }
    }
}

impl EffectParameters {
    pub fn new(effect: EffectKind, intensity: f64, direction: Direction) -> Self {
        Self {
            effect,
            intensity,
            direction,
            ..Self::default()
        }
        .clamped()
    }

    pub fn with_stretch(mut self, kind: StretchKind, amount: f64) -> Self {
        self.stretch_kind = kind;
        self.stretch_amount = amount;
        self.clamped()
    }

    pub fn from_ui(ui: &UiParams, curve: &ResponseCurve) -> Self {
        let ui = ui.clone().clamped();
        Self {
            effect: ui.effect,
            intensity: f64::from(ui.intensity) / f64::from(UI_INTENSITY_MAX),
            direction: ui.direction,
            stretch_kind: ui.stretch_kind,
            stretch_amount: curve.normalize(f64::from(ui.stretch)),
        }
        .clamped()
    }

    /// Intensity and stretch forced into `[0, 1]`; non-finite values become 0.
    pub fn clamped(mut self) -> Self {
        self.intensity = clamp_unit(self.intensity);
        self.stretch_amount = clamp_unit(self.stretch_amount);
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = clamp_unit(intensity);
        self
    }

    /// Whether the effect implements this direction. Unsupported pairs render
    /// as a pass-through of the source.
    pub fn is_supported(&self) -> bool {
        match self.effect {
            EffectKind::PixelSort => matches!(
                self.direction,
                Direction::Vertical | Direction::Horizontal | Direction::Radial
            ),
            EffectKind::SlitScan | EffectKind::Glitch | EffectKind::Combined => true,
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
