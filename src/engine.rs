//! Refresh-driven render loop.
//!
//! The host calls [`Engine::on_refresh`] once per display refresh. Each call
//! runs, in order: automation ticks, at most one render (capture, effect,
//! present), then recording sampling. Every loop has its own rate gate and its
//! own cancellable slot.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use rand::Rng as _;

use crate::{
    automation::{AutomationOptions, AutomationPhase, Automator},
    effects::{EffectContext, apply_effect},
    foundation::{
        config::EngineConfig,
        core::PixelBuffer,
        error::{FxError, FxResult},
    },
    params::{EffectKind, EffectParameters, ParameterSource, UiParams},
    recording::{Recording, RecordingSession, RecordingTarget},
    schedule::{Clock, LoopKind, LoopSlot, RateGate, SystemClock},
    source::{FrameSource, SourceFrame},
    worker::{FrameJob, JobResult, WorkerPool},
};

/// FPS windows kept for the rolling average.
pub const FPS_WINDOWS: usize = 10;
/// Rolling average below this logs a warning.
pub const LOW_FPS_WARNING: f64 = 30.0;

/// Display surface for rendered output.
pub trait Presenter: Send {
    fn present(&mut self, frame: &PixelBuffer);
}

/// Discards frames. Pair with [`Engine::latest_output`] for pull-based use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _frame: &PixelBuffer) {}
}

impl<F: FnMut(&PixelBuffer) + Send> Presenter for F {
    fn present(&mut self, frame: &PixelBuffer) {
        self(frame)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { frame: u64, fell_back: bool },
    /// Handed to the worker pool; presented on a later refresh.
    Submitted { job: u64 },
    /// Rate gate closed; nothing was touched.
    Skipped,
    /// Source not ready; a retry is scheduled.
    NotReady,
    /// Source reached its end.
    Ended,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub automation_ticked: bool,
    pub recording_automation_ticked: bool,
    pub render: Option<RenderOutcome>,
    pub worker_frames_presented: usize,
    pub recorded_frame: bool,
    pub recording_finished: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineStats {
    pub rendered: u64,
    pub skipped: u64,
    pub fallbacks: u64,
    pub not_ready: u64,
    /// Mean of the completed one-second windows, if any.
    pub average_fps: Option<f64>,
}

#[derive(Clone, Debug, Default)]
struct FpsMonitor {
    window_start: Option<Duration>,
    frames: u32,
    windows: VecDeque<f64>,
}

impl FpsMonitor {
    fn record(&mut self, now: Duration) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let span = now.saturating_sub(start);
        if span < Duration::from_secs(1) {
            return None;
        }
        let fps = f64::from(self.frames) / span.as_secs_f64();
        if self.windows.len() == FPS_WINDOWS {
            self.windows.pop_front();
        }
        self.windows.push_back(fps);
        self.window_start = Some(now);
        self.frames = 0;
        self.average()
    }

    fn average(&self) -> Option<f64> {
        if self.windows.is_empty() {
            None
        } else {
            Some(self.windows.iter().sum::<f64>() / self.windows.len() as f64)
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

struct RecordingState {
    session: RecordingSession,
    ctx: EffectContext,
}

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    source: Box<dyn FrameSource>,
    presenter: Box<dyn Presenter>,
    ui: UiParams,

    preview_ctx: EffectContext,
    preview_automation: Automator,
    recording_automation: Automator,
    /// Control values (intensity, stretch) when preview automation was enabled.
    automation_origin: Option<(u32, u32)>,

    preview_gate: RateGate,
    automation_gate: RateGate,
    recording_automation_gate: RateGate,

    preview_slot: LoopSlot,
    automation_slot: LoopSlot,
    recording_slot: LoopSlot,
    recording_automation_slot: LoopSlot,
    retry_slot: LoopSlot,
    render_requested: bool,

    recording: Option<RecordingState>,
    finished: Option<Recording>,
    latest: Option<PixelBuffer>,

    workers: Option<WorkerPool>,
    next_job: u64,
    newest_presented_job: Option<u64>,

    stats: EngineStats,
    fps: FpsMonitor,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("ui", &self.ui)
            .field("frame", &self.preview_ctx.frame())
            .field("preview", &self.preview_slot.is_scheduled())
            .field("automation", &self.preview_automation.phase())
            .field("recording", &self.is_recording())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        source: Box<dyn FrameSource>,
        presenter: Box<dyn Presenter>,
    ) -> FxResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()), source, presenter)
    }

    pub fn with_clock(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        source: Box<dyn FrameSource>,
        presenter: Box<dyn Presenter>,
    ) -> FxResult<Self> {
        config.validate()?;
        let (w, h) = source.dimensions();
        if w == 0 || h == 0 {
            return Err(FxError::validation("source dimensions must be non-zero"));
        }

        let workers = if config.workers.enabled {
            WorkerPool::try_new(config.workers.max_workers)
        } else {
            None
        };

        let automator = |max_step| {
            Automator::new(config.automation_step_secs, max_step, config.stretch_wave)
        };

        Ok(Self {
            preview_ctx: EffectContext::new(config.seed),
            preview_automation: automator(config.preview_max_stretch_step),
            recording_automation: automator(config.recording_max_stretch_step),
            automation_origin: None,
            preview_gate: RateGate::new(config.preview_interval()),
            automation_gate: RateGate::new(config.automation_interval()),
            recording_automation_gate: RateGate::new(config.automation_interval()),
            preview_slot: LoopSlot::new(LoopKind::Preview),
            automation_slot: LoopSlot::new(LoopKind::Automation),
            recording_slot: LoopSlot::new(LoopKind::Recording),
            recording_automation_slot: LoopSlot::new(LoopKind::RecordingAutomation),
            retry_slot: LoopSlot::new(LoopKind::SourceRetry),
            render_requested: false,
            recording: None,
            finished: None,
            latest: None,
            workers,
            next_job: 0,
            newest_presented_job: None,
            stats: EngineStats::default(),
            fps: FpsMonitor::default(),
            ui: UiParams::default(),
            config,
            clock,
            source,
            presenter,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ui(&self) -> &UiParams {
        &self.ui
    }

    pub fn effect_parameters(&self) -> EffectParameters {
        EffectParameters::from_ui(&self.ui, &self.config.stretch_curve)
    }

    /// Current frame counter of the context that renders next.
    pub fn frame(&self) -> u64 {
        match &self.recording {
            Some(rec) => rec.ctx.frame(),
            None => self.preview_ctx.frame(),
        }
    }

    pub fn latest_output(&self) -> Option<&PixelBuffer> {
        self.latest.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            average_fps: self.fps.average(),
            ..self.stats.clone()
        }
    }

    pub fn has_workers(&self) -> bool {
        self.workers.is_some()
    }

    pub fn is_previewing(&self) -> bool {
        self.preview_slot.is_scheduled()
    }

    pub fn automation_phase(&self) -> AutomationPhase {
        self.preview_automation.phase()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
            .as_ref()
            .is_some_and(|r| r.session.is_active())
    }

    pub fn is_render_pending(&self) -> bool {
        self.render_requested
    }

    /// Replaces the control values and asks for one render on the next refresh.
    pub fn set_params(&mut self, ui: UiParams) {
        let ui = ui.clamped();
        if ui != self.ui {
            tracing::debug!(effect = %ui.effect, direction = %ui.direction, "parameters changed");
        }
        self.ui = ui;
        self.request_render();
    }

    /// Polls `src` and applies its values if they changed.
    pub fn poll_params(&mut self, src: &dyn ParameterSource) -> bool {
        let ui = src.current().clamped();
        if ui == self.ui {
            return false;
        }
        self.set_params(ui);
        true
    }

    /// Marks a single render as pending. Repeated requests before the next
    /// refresh collapse into one.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Continuous rendering on every refresh, for moving sources.
    pub fn start_preview(&mut self) {
        if !self.preview_slot.is_scheduled() {
            tracing::debug!("preview loop started");
        }
        self.preview_slot.schedule();
    }

    pub fn stop_preview(&mut self) -> bool {
        self.retry_slot.cancel();
        self.preview_slot.cancel()
    }

    pub fn set_automation(&mut self, enabled: bool, options: AutomationOptions) {
        if enabled {
            self.automation_origin = Some((self.ui.intensity, self.ui.stretch));
            self.preview_automation.enable(options, self.ui.stretch);
            self.ui.auto_intensity = options.intensity;
            self.ui.auto_stretch = options.stretch;
            self.automation_gate.reset();
            self.automation_slot.schedule();
            tracing::info!(?options, "automation enabled");
        } else if self.preview_automation.disable() {
            self.automation_origin = None;
            self.automation_slot.cancel();
            tracing::info!("automation disabled");
        } else {
            self.automation_slot.cancel();
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn start_recording(&mut self, target: RecordingTarget) -> FxResult<()> {
        if self.is_recording() {
            return Err(FxError::validation("a recording is already in progress"));
        }
        let secs = target.resolve(self.source.duration())?;
        if target == RecordingTarget::SourceDuration || self.source.is_moving() {
            self.source.rewind()?;
            self.start_preview();
        }

        let now = self.clock.now();
        self.recording = Some(RecordingState {
            session: RecordingSession::new(now, secs, self.config.recording_fps),
            ctx: EffectContext::new(self.config.seed),
        });
        self.finished = None;
        self.recording_slot.schedule();

        if self.preview_automation.phase() == AutomationPhase::Automating {
            // recording automation starts from the pre-automation control values
            let options = self.preview_automation.options();
            if let Some((intensity, stretch)) = self.automation_origin {
                if options.intensity {
                    self.ui.intensity = intensity;
                }
                if options.stretch {
                    self.ui.stretch = stretch;
                }
            }
            self.recording_automation.enable(options, self.ui.stretch);
            self.recording_automation_gate.reset();
            self.recording_automation_slot.schedule();
        }
        self.request_render();
        tracing::info!(secs, fps = self.config.recording_fps, "recording started");
        Ok(())
    }

    /// Ends the active recording and keeps it for [`Engine::take_recording`].
    /// Returns `false` if nothing was recording.
    pub fn stop_recording(&mut self) -> bool {
        self.recording_slot.cancel();
        self.recording_automation_slot.cancel();
        self.recording_automation.disable();
        let Some(mut state) = self.recording.take() else {
            return false;
        };
        if !state.session.stop() {
            return false;
        }
        let rec = state.session.finish();
        tracing::info!(frames = rec.frames.len(), "recording stopped");
        self.finished = Some(rec);
        true
    }

    pub fn take_recording(&mut self) -> Option<Recording> {
        self.finished.take()
    }

    /// Cancels every loop, discards any partial recording, zeroes the frame
    /// counter and automation time, and re-presents the unmodified source.
    pub fn reset(&mut self) -> FxResult<()> {
        self.preview_slot.cancel();
        self.automation_slot.cancel();
        self.recording_slot.cancel();
        self.recording_automation_slot.cancel();
        self.retry_slot.cancel();
        self.render_requested = false;

        self.preview_automation.reset();
        self.recording_automation.reset();
        self.automation_origin = None;
        self.recording = None;
        self.preview_ctx.clock.reset();

        self.preview_gate.reset();
        self.automation_gate.reset();
        self.recording_automation_gate.reset();
        self.fps.reset();
        if let Some(pool) = self.workers.as_mut() {
            pool.clear_backlog();
        }
        self.newest_presented_job = Some(self.next_job);

        self.source.rewind()?;
        if let SourceFrame::Ready(frame) = self.source.capture()? {
            self.presenter.present(&frame);
            self.latest = Some(frame);
        }
        if self.source.is_moving() {
            self.source.rewind()?;
        }
        tracing::info!("engine reset");
        Ok(())
    }

    /// Captures the current source frame, applies the effect and presents it.
    ///
    /// Gated by the preview rate: a call inside the minimum interval returns
    /// [`RenderOutcome::Skipped`] and touches nothing.
    pub fn render_frame(&mut self) -> FxResult<RenderOutcome> {
        let now = self.clock.now();
        if !self.preview_gate.try_fire(now) {
            self.stats.skipped += 1;
            return Ok(RenderOutcome::Skipped);
        }
        self.render_ungated(now, false)
    }

    fn render_ungated(&mut self, now: Duration, offload: bool) -> FxResult<RenderOutcome> {
        let frame = match self.capture(now)? {
            Ok(frame) => frame,
            Err(outcome) => return Ok(outcome),
        };

        let params = self.effect_parameters();
        let ctx = match self.recording.as_mut() {
            Some(rec) => &mut rec.ctx,
            None => &mut self.preview_ctx,
        };

        if offload && let Some(pool) = self.workers.as_mut() {
            let job = self.next_job;
            self.next_job += 1;
            if let Some(stale) = pool.submit(FrameJob {
                id: job,
                buffer: frame,
                params,
                frame: ctx.frame(),
                seed: ctx.rng.random(),
            }) {
                tracing::trace!(job = stale, "queued frame superseded");
            }
            return Ok(RenderOutcome::Submitted { job });
        }

        let outcome = apply_effect(&frame, &params, ctx);
        let frame_no = ctx.frame();
        tracing::debug!(effect = %params.effect, frame = frame_no, "frame rendered");
        self.present(outcome.buffer, outcome.fell_back, now);
        Ok(RenderOutcome::Rendered {
            frame: frame_no,
            fell_back: outcome.fell_back,
        })
    }

    /// `Ok(Err(outcome))` when there is no frame to render this time.
    fn capture(&mut self, now: Duration) -> FxResult<Result<PixelBuffer, RenderOutcome>> {
        match self.source.capture() {
            Ok(SourceFrame::Ready(frame)) => {
                self.retry_slot.cancel();
                Ok(Ok(frame))
            }
            Ok(SourceFrame::NotReady) | Err(FxError::Source(_)) => {
                self.stats.not_ready += 1;
                self.retry_slot
                    .schedule_after(now, self.config.source_retry_delay());
                tracing::trace!("source not ready; retry scheduled");
                Ok(Err(RenderOutcome::NotReady))
            }
            Ok(SourceFrame::Ended) => {
                if self.is_recording() {
                    self.stop_recording();
                } else if self.source.is_moving() {
                    self.source.rewind()?;
                    tracing::debug!("source ended; rewound");
                    self.retry_slot.schedule();
                }
                Ok(Err(RenderOutcome::Ended))
            }
            Err(err) => Err(err),
        }
    }

    fn present(&mut self, buffer: PixelBuffer, fell_back: bool, now: Duration) {
        self.presenter.present(&buffer);
        self.latest = Some(buffer);
        self.stats.rendered += 1;
        if fell_back {
            self.stats.fallbacks += 1;
        }
        if let Some(avg) = self.fps.record(now)
            && avg < LOW_FPS_WARNING
        {
            tracing::warn!(average_fps = avg, "render rate below target");
        }
    }

    fn collect_worker_results(&mut self, now: Duration) -> usize {
        let results = match self.workers.as_mut() {
            Some(pool) => pool.poll(),
            None => return 0,
        };
        self.present_job_results(results, now)
    }

    /// Presents finished jobs in submission order, dropping any older than a
    /// result already shown.
    fn present_job_results(&mut self, results: Vec<JobResult>, now: Duration) -> usize {
        let mut presented = 0;
        for result in results {
            if self.newest_presented_job.is_some_and(|n| result.id < n) {
                continue;
            }
            self.newest_presented_job = Some(result.id + 1);
            let advances = !result.outcome.fell_back
                && matches!(
                    result.effect,
                    EffectKind::SlitScan | EffectKind::Combined
                );
            if advances {
                match self.recording.as_mut() {
                    Some(rec) => rec.ctx.clock.advance(),
                    None => self.preview_ctx.clock.advance(),
                }
            }
            self.present(result.outcome.buffer, result.outcome.fell_back, now);
            presented += 1;
        }
        presented
    }

    /// One display refresh. Never fails: render errors are logged and the
    /// loops keep running.
    pub fn on_refresh(&mut self) -> RefreshReport {
        let now = self.clock.now();
        let mut report = RefreshReport {
            worker_frames_presented: self.collect_worker_results(now),
            ..RefreshReport::default()
        };

        let was_recording = self.is_recording();
        let recording_automates = self.recording_automation.phase() == AutomationPhase::Automating
            && self.recording_automation_slot.is_scheduled();

        if self.automation_slot.is_scheduled()
            && !recording_automates
            && self.automation_gate.try_fire(now)
            && self.preview_automation.tick(&mut self.ui).is_some()
        {
            report.automation_ticked = true;
            self.request_render();
        }

        if recording_automates
            && self.recording_automation_gate.try_fire(now)
            && let Some(tick) = self.recording_automation.tick(&mut self.ui)
        {
            report.recording_automation_ticked = true;
            if let Some(stretch) = tick.stretch
                && let Some(rec) = self.recording.as_ref()
                && rec.session.frame_count() % 30 == 0
            {
                tracing::debug!(stretch, frames = rec.session.frame_count(), "recording automation");
            }
            self.request_render();
        }

        let wants_render = self.render_requested
            || (self.preview_slot.is_scheduled() && self.source.is_moving())
            || self.retry_slot.is_due(now);
        if wants_render {
            if self.preview_gate.try_fire(now) {
                self.render_requested = false;
                self.retry_slot.cancel();
                let offload = self.workers.is_some();
                report.render = Some(match self.render_ungated(now, offload) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        tracing::warn!(error = %err, "render failed; keeping previous output");
                        RenderOutcome::Skipped
                    }
                });
            } else {
                self.stats.skipped += 1;
                report.render = Some(RenderOutcome::Skipped);
            }
        }

        if self.recording_slot.is_scheduled() {
            let complete = self
                .recording
                .as_ref()
                .is_none_or(|r| r.session.is_complete(now));
            if complete {
                report.recording_finished = self.stop_recording();
            } else if let (Some(rec), Some(latest)) = (self.recording.as_mut(), self.latest.as_ref())
            {
                report.recorded_frame = rec.session.sample(now, latest);
            }
        }
        report.recording_finished |= was_recording && !self.is_recording();

        report
    }

    /// Waits for outstanding worker jobs and presents their results.
    pub fn flush_workers(&mut self, timeout: Duration) -> usize {
        let now = self.clock.now();
        let results = match self.workers.as_mut() {
            Some(pool) => pool.drain(timeout),
            None => return 0,
        };
        self.present_job_results(results, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Rgba,
        params::Direction,
        schedule::ManualClock,
        source::{SequenceSource, StillSource},
    };

    fn still(w: u32, h: u32) -> Box<dyn FrameSource> {
        let mut buf = PixelBuffer::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                buf.set_pixel(x, y, Rgba::new((x * 20) as u8, (y * 20) as u8, 90, 255));
            }
        }
        Box::new(StillSource::new(buf).unwrap())
    }

    fn engine(source: Box<dyn FrameSource>) -> (Engine, ManualClock) {
        let clock = ManualClock::new();
        let cfg = EngineConfig {
            seed: Some(1),
            ..EngineConfig::default()
        };
        let engine =
            Engine::with_clock(cfg, Arc::new(clock.clone()), source, Box::new(NullPresenter))
                .unwrap();
        (engine, clock)
    }

    #[test]
    fn fps_monitor_rolls_windows() {
        let mut m = FpsMonitor::default();
        for i in 0..=20u64 {
            m.record(Duration::from_millis(i * 50));
        }
        let avg = m.average().unwrap();
        assert!((avg - 21.0).abs() < 1e-9, "{avg}");
    }

    #[test]
    fn set_params_requests_exactly_one_render() {
        let (mut e, clock) = engine(still(6, 6));
        e.set_params(UiParams {
            effect: EffectKind::SlitScan,
            direction: Direction::Wave,
            intensity: 80,
            ..UiParams::default()
        });
        e.set_params(e.ui().clone());
        let first = e.on_refresh();
        assert!(matches!(first.render, Some(RenderOutcome::Rendered { .. })));
        clock.advance(Duration::from_millis(20));
        assert_eq!(e.on_refresh().render, None);
        assert_eq!(e.frame(), 1);
    }

    #[test]
    fn sequence_end_rewinds_outside_recording() {
        let frames = vec![PixelBuffer::filled(2, 2, Rgba::BLACK).unwrap(); 2];
        let (mut e, clock) = engine(Box::new(SequenceSource::new(frames, 30.0).unwrap()));
        e.start_preview();
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(e.on_refresh().render);
            clock.advance(Duration::from_millis(10));
        }
        assert_eq!(outcomes[2], Some(RenderOutcome::Ended));
        assert!(matches!(outcomes[3], Some(RenderOutcome::Rendered { .. })));
    }
}
