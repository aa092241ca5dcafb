//! Slitscan is a pixel-effects engine for stills, frame streams and video.
//!
//! - Pick an effect with [`UiParams`] / [`EffectParameters`]
//! - Run one pass with [`apply_effect`], or drive an [`Engine`] from a display
//!   refresh callback for preview, automation and recording
//! - Hand a finished [`Recording`] to [`export_recording`]
#![forbid(unsafe_code)]

mod foundation;

pub mod automation;
pub mod color;
pub mod effects;
pub mod engine;
pub mod export;
pub mod media;
pub mod params;
pub mod recording;
pub mod schedule;
pub mod source;
pub mod worker;

pub use crate::foundation::config::{EngineConfig, WorkerConfig};
pub use crate::foundation::core::{PixelBuffer, Rgba};
pub use crate::foundation::error::{FxError, FxResult};

pub use crate::automation::{
    AutomationOptions, AutomationPhase, AutomationState, AutomationTick, Automator, StretchWave,
};
pub use crate::effects::{EffectContext, EffectOutcome, FrameClock, apply_effect};
pub use crate::engine::{Engine, EngineStats, NullPresenter, Presenter, RefreshReport, RenderOutcome};
pub use crate::export::{
    ExportFormat, ExportReport, FfmpegSink, FrameSink, InMemorySink, PngSequenceSink, SinkConfig,
    export_recording, is_ffmpeg_on_path,
};
pub use crate::media::VideoFileSource;
pub use crate::params::{
    Direction, EffectKind, EffectParameters, ParameterSource, ResponseCurve, StretchKind, UiParams,
};
pub use crate::recording::{
    RecordedFrame, Recording, RecordingMetadata, RecordingSession, RecordingTarget,
};
pub use crate::schedule::{Clock, LoopKind, LoopSlot, ManualClock, RateGate, SystemClock};
pub use crate::source::{FrameSource, SequenceSource, SourceFrame, StillSource};
pub use crate::worker::{FrameJob, JobResult, WorkerPool};
