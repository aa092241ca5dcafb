use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    export::{
        ExportFormat, ensure_parent_dir,
        sink::{FrameSink, SinkConfig},
    },
    foundation::error::{FxError, FxResult},
    recording::RecordedFrame,
};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encodes frames by piping raw RGBA into the system `ffmpeg` binary.
///
/// Alpha is flattened over black. Odd dimensions are padded to even, since
/// both codecs emit yuv420p.
pub struct FfmpegSink {
    format: ExportFormat,
    out_path: PathBuf,
    overwrite: bool,
    cfg: Option<SinkConfig>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for FfmpegSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSink")
            .field("format", &self.format)
            .field("out_path", &self.out_path)
            .field("running", &self.child.is_some())
            .finish()
    }
}

impl FfmpegSink {
    pub fn new(format: ExportFormat, out_path: impl Into<PathBuf>) -> FxResult<Self> {
        if !format.is_video() {
            return Err(FxError::validation(format!(
                "ffmpeg sink cannot write '{format}'"
            )));
        }
        Ok(Self {
            format,
            out_path: out_path.into(),
            overwrite: true,
            cfg: None,
            child: None,
            stdin: None,
            scratch: Vec::new(),
        })
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    fn fail(&self, reason: impl Into<String>) -> FxError {
        FxError::export(self.format, reason, Some(ExportFormat::PngSequence))
    }

    fn codec_args(&self) -> &'static [&'static str] {
        match self.format {
            ExportFormat::WebM => &["-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "32"],
            ExportFormat::Mp4 => &["-c:v", "libx264", "-movflags", "+faststart"],
            ExportFormat::PngSequence => &[],
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> FxResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(FxError::validation("encode width/height must be non-zero"));
        }
        if !cfg.fps.is_finite() || cfg.fps <= 0.0 {
            return Err(FxError::validation("encode fps must be finite and > 0"));
        }
        if !self.overwrite && self.out_path.exists() {
            return Err(FxError::validation(format!(
                "output file '{}' already exists",
                self.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(self.fail("ffmpeg was not found on PATH"));
        }
        ensure_parent_dir(&self.out_path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}", cfg.fps),
            "-i",
            "pipe:0",
            "-an",
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
        ])
        .args(self.codec_args())
        .args(["-pix_fmt", "yuv420p"])
        .arg(&self.out_path);

        let mut child = cmd
            .spawn()
            .map_err(|e| self.fail(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.fail("failed to open ffmpeg stdin"))?;

        self.scratch = vec![0u8; cfg.width as usize * cfg.height as usize * 4];
        self.cfg = Some(cfg);
        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    fn push_frame(&mut self, _idx: usize, frame: &RecordedFrame) -> FxResult<()> {
        let Some(cfg) = self.cfg.as_ref() else {
            return Err(self.fail("push_frame called before begin"));
        };
        let buf = &frame.buffer;
        if buf.width != cfg.width || buf.height != cfg.height {
            return Err(FxError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                buf.width, buf.height, cfg.width, cfg.height
            )));
        }
        flatten_over_black(&mut self.scratch, &buf.data)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.fail("ffmpeg encoder is already finalized"));
        };
        if let Err(e) = stdin.write_all(&self.scratch) {
            return Err(self.fail(format!("failed to write frame to ffmpeg stdin: {e}")));
        }
        Ok(())
    }

    fn end(&mut self) -> FxResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Err(self.fail("end called before begin"));
        };

        let output = child
            .wait_with_output()
            .map_err(|e| self.fail(format!("failed to wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.fail(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Straight-alpha RGBA composited over opaque black.
fn flatten_over_black(dst: &mut [u8], src: &[u8]) -> FxResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(FxError::validation(
            "flatten_over_black expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        d[0] = mul_div255(u16::from(s[0]), a) as u8;
        d[1] = mul_div255(u16::from(s[1]), a) as u8;
        d[2] = mul_div255(u16::from(s[2]), a) as u8;
        d[3] = 255;
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_half_alpha_red() {
        let src = vec![255u8, 0, 0, 128];
        let mut dst = vec![0u8; 4];
        flatten_over_black(&mut dst, &src).unwrap();
        assert_eq!(dst, vec![128, 0, 0, 255]);
    }

    #[test]
    fn flatten_rejects_mismatched_lengths() {
        let mut dst = vec![0u8; 8];
        assert!(flatten_over_black(&mut dst, &[0u8; 4]).is_err());
    }

    #[test]
    fn png_sequence_is_not_an_ffmpeg_format() {
        assert!(FfmpegSink::new(ExportFormat::PngSequence, "out").is_err());
        assert!(FfmpegSink::new(ExportFormat::WebM, "out.webm").is_ok());
    }
}
