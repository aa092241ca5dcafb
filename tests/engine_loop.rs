use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use slitscan::{
    AutomationOptions, AutomationPhase, Direction, EffectKind, Engine, EngineConfig, FrameSource,
    ManualClock, NullPresenter, PixelBuffer, RecordingTarget, RenderOutcome, Rgba,
    SequenceSource, StillSource, StretchKind, UiParams, WorkerConfig,
};

type Presented = Arc<Mutex<Vec<PixelBuffer>>>;

fn pattern(w: u32, h: u32, tint: u8) -> PixelBuffer {
    let mut buf = PixelBuffer::new(w, h).unwrap();
    for y in 0..h {
        for x in 0..w {
            buf.set_pixel(x, y, Rgba::new((x * 16) as u8, (y * 16) as u8, tint, 255));
        }
    }
    buf
}

fn config() -> EngineConfig {
    EngineConfig {
        seed: Some(7),
        ..EngineConfig::default()
    }
}

fn engine_with(
    cfg: EngineConfig,
    source: Box<dyn FrameSource>,
) -> (Engine, ManualClock, Presented) {
    let clock = ManualClock::new();
    let presented: Presented = Arc::default();
    let sink = presented.clone();
    let presenter = move |frame: &PixelBuffer| sink.lock().unwrap().push(frame.clone());
    let engine = Engine::with_clock(cfg, Arc::new(clock.clone()), source, Box::new(presenter))
        .unwrap();
    (engine, clock, presented)
}

fn still_engine() -> (Engine, ManualClock, Presented) {
    engine_with(config(), Box::new(StillSource::new(pattern(12, 10, 40)).unwrap()))
}

fn slit_ui() -> UiParams {
    UiParams {
        effect: EffectKind::SlitScan,
        direction: Direction::Wave,
        intensity: 70,
        ..UiParams::default()
    }
}

#[test]
fn second_render_inside_interval_does_nothing() {
    let (mut e, clock, presented) = still_engine();
    e.set_params(slit_ui());

    let first = e.render_frame().unwrap();
    assert_eq!(first, RenderOutcome::Rendered { frame: 1, fell_back: false });
    let after_first = e.latest_output().cloned();

    clock.advance(Duration::from_millis(4));
    assert_eq!(e.render_frame().unwrap(), RenderOutcome::Skipped);
    assert_eq!(e.frame(), 1);
    assert_eq!(e.latest_output().cloned(), after_first);
    assert_eq!(presented.lock().unwrap().len(), 1);
    assert_eq!(e.stats().skipped, 1);

    clock.advance(Duration::from_millis(5));
    assert!(matches!(e.render_frame().unwrap(), RenderOutcome::Rendered { frame: 2, .. }));
}

#[test]
fn automation_never_jumps_more_than_max_step() {
    let (mut e, clock, _) = still_engine();
    e.set_params(UiParams {
        stretch: 0,
        auto_speed: 100,
        ..slit_ui()
    });
    e.set_automation(true, AutomationOptions { intensity: true, stretch: true });
    assert_eq!(e.automation_phase(), AutomationPhase::Automating);

    let max_step = e.config().preview_max_stretch_step;
    let mut prev = e.ui().stretch;
    let mut ticks = 0;
    for _ in 0..600 {
        let report = e.on_refresh();
        if report.automation_ticked {
            ticks += 1;
            let now = e.ui().stretch;
            let delta = (f64::from(now) - f64::from(prev)).abs();
            assert!(delta <= max_step, "stretch moved {prev} -> {now}");
            assert!((20..=100).contains(&e.ui().intensity));
            prev = now;
        }
        clock.advance(Duration::from_millis(17));
    }
    assert!(ticks > 500);
    assert!(prev > 0, "stretch never moved toward its target");
}

#[test]
fn capture_effect_present_then_sample() {
    let (mut e, clock, presented) = still_engine();
    e.set_params(slit_ui());
    e.start_recording(RecordingTarget::Seconds(0.2)).unwrap();

    let report = e.on_refresh();
    assert!(matches!(report.render, Some(RenderOutcome::Rendered { .. })));
    assert!(report.recorded_frame);

    while e.is_recording() {
        clock.advance(Duration::from_millis(10));
        e.on_refresh();
    }
    let rec = e.take_recording().unwrap();
    let presented = presented.lock().unwrap();
    assert_eq!(rec.frames[0].buffer, presented[0]);
    for frame in &rec.frames {
        assert!(presented.contains(&frame.buffer));
    }
}

#[test]
fn stopping_is_idempotent() {
    let (mut e, _, _) = still_engine();
    e.start_preview();
    assert!(e.stop_preview());
    assert!(!e.stop_preview());

    e.set_automation(true, AutomationOptions::default());
    e.set_automation(false, AutomationOptions::default());
    e.set_automation(false, AutomationOptions::default());
    assert_eq!(e.automation_phase(), AutomationPhase::Idle);
    assert!(!e.on_refresh().automation_ticked);

    e.start_recording(RecordingTarget::Seconds(1.0)).unwrap();
    assert!(e.start_recording(RecordingTarget::Seconds(1.0)).is_err());
    assert!(e.stop_recording());
    assert!(!e.stop_recording());
    assert!(!e.is_recording());
    assert!(!e.on_refresh().recorded_frame);
}

#[test]
fn one_second_recording_at_thirty_fps() {
    let (mut e, clock, _) = still_engine();
    e.set_params(slit_ui());
    e.start_recording(RecordingTarget::Seconds(1.0)).unwrap();

    let step = e.config().recording_interval();
    let mut finished = 0;
    for _ in 0..100 {
        if e.on_refresh().recording_finished {
            finished += 1;
        }
        clock.advance(step);
    }
    assert_eq!(finished, 1);

    let rec = e.take_recording().unwrap();
    assert!((30..=31).contains(&rec.frames.len()), "{}", rec.frames.len());
    assert!(rec.frames.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(rec.fps, 30.0);
    assert!(e.take_recording().is_none());
}

#[test]
fn recording_automation_suspends_preview_automation() {
    let (mut e, clock, _) = still_engine();
    e.set_params(slit_ui());
    e.set_automation(true, AutomationOptions::default());
    e.start_recording(RecordingTarget::Seconds(0.5)).unwrap();

    let mut preview_ticks = 0;
    let mut recording_ticks = 0;
    while e.is_recording() {
        let report = e.on_refresh();
        preview_ticks += usize::from(report.automation_ticked);
        recording_ticks += usize::from(report.recording_automation_ticked);
        clock.advance(Duration::from_millis(17));
    }
    assert_eq!(preview_ticks, 0);
    assert!(recording_ticks > 20);

    // preview automation resumes once the recording is over
    clock.advance(Duration::from_millis(17));
    assert!(e.on_refresh().automation_ticked);
}

fn automated_recording_after(preview_ticks: usize) -> Vec<PixelBuffer> {
    let (mut e, clock, _) = still_engine();
    e.set_params(UiParams {
        stretch_kind: StretchKind::Gradient,
        stretch: 0,
        auto_speed: 80,
        ..slit_ui()
    });
    e.set_automation(true, AutomationOptions::default());
    for _ in 0..preview_ticks {
        e.on_refresh();
        clock.advance(Duration::from_millis(17));
    }

    e.start_recording(RecordingTarget::Seconds(0.3)).unwrap();
    while e.is_recording() {
        e.on_refresh();
        clock.advance(Duration::from_millis(17));
    }
    let rec = e.take_recording().unwrap();
    rec.frames.into_iter().map(|f| f.buffer).collect()
}

#[test]
fn automated_recording_ignores_preview_progress() {
    let early = automated_recording_after(10);
    let late = automated_recording_after(300);
    assert!(!early.is_empty());
    assert_eq!(early.len(), late.len());
    assert!(early == late, "recordings differ after different preview runs");
}

#[test]
fn not_ready_source_is_retried_after_delay() {
    let frames = vec![pattern(6, 6, 0), pattern(6, 6, 1)];
    let source = SequenceSource::new(frames, 30.0).unwrap().with_warmup(1);
    let (mut e, clock, _) = engine_with(config(), Box::new(source));
    e.request_render();

    assert_eq!(e.on_refresh().render, Some(RenderOutcome::NotReady));
    clock.advance(Duration::from_millis(50));
    assert_eq!(e.on_refresh().render, None);
    clock.advance(Duration::from_millis(50));
    assert!(matches!(e.on_refresh().render, Some(RenderOutcome::Rendered { .. })));
    assert_eq!(e.stats().not_ready, 1);
}

#[test]
fn source_duration_recording_ends_with_the_stream() {
    let frames = (0..6).map(|i| pattern(4, 4, i)).collect::<Vec<_>>();
    let source = SequenceSource::new(frames, 30.0).unwrap();
    let (mut e, clock, _) = engine_with(config(), Box::new(source));
    e.start_recording(RecordingTarget::SourceDuration).unwrap();
    assert!(e.is_previewing());

    for _ in 0..200 {
        if !e.is_recording() {
            break;
        }
        e.on_refresh();
        clock.advance(Duration::from_millis(9));
    }
    assert!(!e.is_recording());
    let rec = e.take_recording().unwrap();
    assert!(!rec.is_empty());
    assert!(rec.target_secs > 0.19 && rec.target_secs < 0.21);
}

#[test]
fn reset_restores_source_and_discards_partial_recording() {
    let src = pattern(12, 10, 40);
    let (mut e, clock, _) = engine_with(config(), Box::new(StillSource::new(src.clone()).unwrap()));
    e.set_params(slit_ui());
    e.set_automation(true, AutomationOptions::default());
    e.start_recording(RecordingTarget::Seconds(5.0)).unwrap();
    for _ in 0..10 {
        e.on_refresh();
        clock.advance(Duration::from_millis(20));
    }
    assert!(e.frame() > 0);

    e.reset().unwrap();
    assert_eq!(e.frame(), 0);
    assert!(!e.is_recording());
    assert!(!e.is_previewing());
    assert_eq!(e.automation_phase(), AutomationPhase::Idle);
    assert!(e.take_recording().is_none());
    assert_eq!(e.latest_output(), Some(&src));

    e.reset().unwrap();
    assert_eq!(e.on_refresh().render, None);
}

#[test]
fn polled_controls_trigger_a_single_render() {
    let (mut e, clock, presented) = still_engine();
    let controls = Arc::new(Mutex::new(slit_ui()));

    assert!(e.poll_params(&controls));
    assert!(!e.poll_params(&controls));
    e.on_refresh();
    clock.advance(Duration::from_millis(20));
    e.on_refresh();
    assert_eq!(presented.lock().unwrap().len(), 1);

    controls.lock().unwrap().intensity = 10;
    assert!(e.poll_params(&controls));
    clock.advance(Duration::from_millis(20));
    e.on_refresh();
    assert_eq!(presented.lock().unwrap().len(), 2);
}

#[test]
fn worker_results_arrive_on_a_later_refresh() {
    let cfg = EngineConfig {
        workers: WorkerConfig {
            enabled: true,
            max_workers: 2,
        },
        ..config()
    };
    let (mut e, _, _) = engine_with(cfg, Box::new(StillSource::new(pattern(8, 8, 3)).unwrap()));
    if !e.has_workers() {
        return;
    }
    e.set_params(slit_ui());

    assert!(matches!(e.on_refresh().render, Some(RenderOutcome::Submitted { job: 0 })));
    assert_eq!(e.flush_workers(Duration::from_secs(10)), 1);
    assert!(e.latest_output().is_some());
    assert_eq!(e.frame(), 1);
}

#[test]
fn null_presenter_still_exposes_latest_output() {
    let clock = ManualClock::new();
    let mut e = Engine::with_clock(
        config(),
        Arc::new(clock),
        Box::new(StillSource::new(pattern(4, 4, 0)).unwrap()),
        Box::new(NullPresenter),
    )
    .unwrap();
    assert!(e.latest_output().is_none());
    e.request_render();
    e.on_refresh();
    assert!(e.latest_output().is_some());
}
