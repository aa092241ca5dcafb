use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    export::{
        ExportFormat, ensure_dir,
        sink::{FrameSink, SinkConfig},
    },
    foundation::error::{FxError, FxResult},
    recording::{RecordedFrame, RecordingMetadata},
};

pub const METADATA_FILE: &str = "metadata.json";

pub fn frame_file_name(idx: usize) -> String {
    format!("frame_{idx:04}.png")
}

/// Writes `frame_0000.png`, `frame_0001.png`, ... plus `metadata.json` into a
/// directory.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    cfg: Option<SinkConfig>,
    written: usize,
    last_timestamp: f64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            written: 0,
            last_timestamp: 0.0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn export_err(&self, reason: impl Into<String>) -> FxError {
        FxError::export(ExportFormat::PngSequence, reason, None)
    }
}

impl FrameSink for PngSequenceSink {
    fn begin(&mut self, cfg: SinkConfig) -> FxResult<()> {
        ensure_dir(&self.dir)?;
        self.cfg = Some(cfg);
        self.written = 0;
        self.last_timestamp = 0.0;
        Ok(())
    }

    fn push_frame(&mut self, idx: usize, frame: &RecordedFrame) -> FxResult<()> {
        let Some(cfg) = self.cfg.as_ref() else {
            return Err(self.export_err("push_frame called before begin"));
        };
        let buf = &frame.buffer;
        if buf.width != cfg.width || buf.height != cfg.height {
            return Err(self.export_err(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                buf.width, buf.height, cfg.width, cfg.height
            )));
        }

        let path = self.dir.join(frame_file_name(idx));
        image::save_buffer_with_format(
            &path,
            &buf.data,
            buf.width,
            buf.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;

        self.written += 1;
        self.last_timestamp = frame.timestamp.as_secs_f64();
        Ok(())
    }

    fn end(&mut self) -> FxResult<()> {
        let Some(cfg) = self.cfg.as_ref() else {
            return Err(self.export_err("end called before begin"));
        };
        let meta = RecordingMetadata {
            frame_count: self.written,
            duration: self.last_timestamp,
            fps: cfg.fps,
            canvas_width: cfg.width,
            canvas_height: cfg.height,
        };
        let path = self.dir.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| FxError::serde(format!("encode recording metadata: {e}")))?;
        std::fs::write(&path, json)
            .with_context(|| format!("write metadata '{}'", path.display()))?;
        tracing::debug!(dir = %self.dir.display(), frames = self.written, "png sequence written");
        Ok(())
    }
}
