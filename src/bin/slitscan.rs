use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use slitscan::{
    AutomationOptions, Direction, EffectContext, EffectKind, EffectParameters, Engine,
    EngineConfig, ExportFormat, FrameClock, FrameSource, FxError, ManualClock, NullPresenter,
    RecordingTarget, StillSource, StretchKind, UiParams, VideoFileSource,
};

/// Simulated display refresh rate for headless recording.
const HEADLESS_REFRESH_HZ: f64 = 60.0;

#[derive(Parser, Debug)]
#[command(name = "slitscan", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine config JSON; unspecified keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply one effect pass to an image and write a PNG.
    Frame(FrameArgs),
    /// Drive the engine headless and export the recording.
    Record(RecordArgs),
}

#[derive(Args, Debug)]
struct EffectArgs {
    #[arg(long, default_value = "slit-scan")]
    effect: EffectKind,

    #[arg(long, default_value = "vertical")]
    direction: Direction,

    #[arg(long, default_value = "uniform")]
    stretch_kind: StretchKind,

    /// 0..=100
    #[arg(long, default_value_t = 50)]
    intensity: u32,

    /// 0..=200
    #[arg(long, default_value_t = 0)]
    stretch: u32,

    /// Seed for glitch, random stretch and shuffle sorting.
    #[arg(long)]
    seed: Option<u64>,
}

impl EffectArgs {
    fn ui(&self) -> UiParams {
        UiParams {
            effect: self.effect,
            direction: self.direction,
            stretch_kind: self.stretch_kind,
            intensity: self.intensity,
            stretch: self.stretch,
            ..UiParams::default()
        }
    }
}

#[derive(Args, Debug)]
struct FrameArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Frame counter value the effect sees (phases waves, picks the sort key).
    #[arg(long, default_value_t = 0)]
    frame: u64,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Input image or video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output file, or directory for png-sequence.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "webm")]
    format: ExportFormat,

    /// Recording length. Videos default to their own duration.
    #[arg(long)]
    seconds: Option<f64>,

    /// Treat the input as video regardless of extension.
    #[arg(long)]
    video: bool,

    /// Animate intensity and stretch while recording.
    #[arg(long)]
    auto: bool,

    /// 0..=100
    #[arg(long, default_value_t = 50)]
    auto_speed: u32,

    #[arg(long)]
    no_auto_intensity: bool,

    #[arg(long)]
    no_auto_stretch: bool,

    #[command(flatten)]
    effect: EffectArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.cmd {
        Command::Frame(args) => cmd_frame(args, config),
        Command::Record(args) => {
            if args.effect.seed.is_some() {
                config.seed = args.effect.seed;
            }
            cmd_record(args, config)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_frame(args: FrameArgs, config: EngineConfig) -> anyhow::Result<()> {
    let source = StillSource::open(&args.in_path)?;
    let params = EffectParameters::from_ui(&args.effect.ui(), &config.stretch_curve);

    let mut ctx = EffectContext::new(args.effect.seed.or(config.seed));
    ctx.clock = FrameClock::new(args.frame);
    let outcome = slitscan::apply_effect(source.frame(), &params, &mut ctx);
    if outcome.fell_back {
        eprintln!("warning: effect failed; wrote the unmodified source");
    }

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let frame = &outcome.buffer;
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn looks_like_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "mp4" | "webm" | "mov" | "mkv" | "avi"
            )
        })
}

fn cmd_record(args: RecordArgs, config: EngineConfig) -> anyhow::Result<()> {
    let is_video = args.video || looks_like_video(&args.in_path);
    let source: Box<dyn FrameSource> = if is_video {
        Box::new(VideoFileSource::open(&args.in_path)?)
    } else {
        Box::new(StillSource::open(&args.in_path)?)
    };
    let target = match (args.seconds, is_video) {
        (Some(s), _) => RecordingTarget::Seconds(s),
        (None, true) => RecordingTarget::SourceDuration,
        (None, false) => RecordingTarget::Seconds(UiParams::default().recording_seconds),
    };

    let clock = ManualClock::new();
    let mut engine = Engine::with_clock(
        config,
        Arc::new(clock.clone()),
        source,
        Box::new(NullPresenter),
    )?;

    let ui = UiParams {
        auto_speed: args.auto_speed,
        auto_intensity: !args.no_auto_intensity,
        auto_stretch: !args.no_auto_stretch,
        ..args.effect.ui()
    };
    engine.set_params(ui.clone());
    if args.auto {
        engine.set_automation(true, AutomationOptions::from_ui(&ui));
    }
    if is_video {
        engine.start_preview();
    }
    engine.start_recording(target)?;

    let step = Duration::from_secs_f64(1.0 / HEADLESS_REFRESH_HZ);
    while engine.is_recording() {
        engine.on_refresh();
        clock.advance(step);
    }
    engine.flush_workers(Duration::from_secs(30));

    let rec = engine
        .take_recording()
        .context("recording finished without frames")?;
    eprintln!(
        "recorded {} frames ({:.2}s)",
        rec.frames.len(),
        rec.duration_secs()
    );

    match slitscan::export_recording(&rec, args.format, &args.out) {
        Ok(report) => {
            eprintln!("wrote {} ({})", report.path.display(), report.format);
            Ok(())
        }
        Err(err @ FxError::Export { .. }) => {
            if let Some(fallback) = err.fallback_format() {
                eprintln!("hint: re-run with --format {fallback}");
            }
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
