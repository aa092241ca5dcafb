//! Hands finished recordings to a container/format sink.

pub mod ffmpeg;
pub mod png_seq;
pub mod sink;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context as _;

use crate::{
    foundation::error::{FxError, FxResult},
    recording::Recording,
};

pub use ffmpeg::{FfmpegSink, is_ffmpeg_on_path};
pub use png_seq::PngSequenceSink;
pub use sink::{FrameSink, InMemorySink, SinkConfig, write_recording};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// VP9 in WebM; preferred.
    #[serde(rename = "webm")]
    WebM,
    Mp4,
    /// Directory of PNG frames plus a JSON sidecar.
    PngSequence,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::PngSequence => "png-sequence",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::WebM | Self::Mp4)
    }

    /// File extension for video formats; `None` for directory outputs.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::WebM => Some("webm"),
            Self::Mp4 => Some("mp4"),
            Self::PngSequence => None,
        }
    }

    /// Format to retry with when this one fails.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::WebM | Self::Mp4 => Some(Self::PngSequence),
            Self::PngSequence => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webm" => Ok(Self::WebM),
            "mp4" => Ok(Self::Mp4),
            "png-sequence" | "png" => Ok(Self::PngSequence),
            other => Err(FxError::validation(format!(
                "unknown export format '{other}' (expected webm, mp4 or png-sequence)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub frames: usize,
}

/// Writes `rec` to `out` in `format`. For [`ExportFormat::PngSequence`] `out`
/// is a directory.
///
/// Failures are reported as [`FxError::Export`] carrying a suggested fallback
/// format; nothing is retried automatically.
#[tracing::instrument(skip(rec), fields(frames = rec.frames.len()))]
pub fn export_recording(rec: &Recording, format: ExportFormat, out: &Path) -> FxResult<ExportReport> {
    if rec.is_empty() {
        return Err(FxError::export(format, "recording has no frames", None));
    }

    let mut sink: Box<dyn FrameSink> = match format {
        ExportFormat::WebM | ExportFormat::Mp4 => Box::new(FfmpegSink::new(format, out)?),
        ExportFormat::PngSequence => Box::new(PngSequenceSink::new(out)),
    };

    write_recording(rec, sink.as_mut()).map_err(|err| match err {
        FxError::Export { .. } => err,
        other => FxError::export(format, other.to_string(), format.fallback()),
    })?;

    tracing::info!(%format, path = %out.display(), frames = rec.frames.len(), "recording exported");
    Ok(ExportReport {
        format,
        path: out.to_path_buf(),
        frames: rec.frames.len(),
    })
}

pub(crate) fn ensure_dir(dir: &Path) -> FxResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> FxResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    Ok(())
}
