//! Video file source backed by the system `ffprobe`/`ffmpeg` binaries.
//!
//! Decoding requires the `media-ffmpeg` feature; without it, opening a video
//! is a validation error.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    foundation::{
        core::PixelBuffer,
        error::{FxError, FxResult},
    },
    source::{FrameSource, SourceFrame},
};

/// Frames decoded per ffmpeg invocation.
pub const DECODE_BATCH: u32 = 32;

#[derive(Clone, Debug)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }

    /// Frame count implied by duration and rate.
    pub fn frame_count(&self) -> u64 {
        (self.duration_sec * self.fps()).floor().max(0.0) as u64
    }
}

/// Plays a video file forward one frame per capture.
#[derive(Debug)]
pub struct VideoFileSource {
    info: VideoInfo,
    next_index: u64,
    pending: VecDeque<Vec<u8>>,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> FxResult<Self> {
        let info = probe_video(path)?;
        if info.width == 0 || info.height == 0 || info.fps() <= 0.0 {
            return Err(FxError::validation(format!(
                "video '{}' has no usable frames",
                path.display()
            )));
        }
        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps(),
            duration_sec = info.duration_sec,
            "video opened"
        );
        Ok(Self {
            info,
            next_index: 0,
            pending: VecDeque::new(),
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn refill(&mut self) -> FxResult<()> {
        let remaining = self.info.frame_count().saturating_sub(self.next_index);
        let count = remaining.min(u64::from(DECODE_BATCH)) as u32;
        if count == 0 {
            return Ok(());
        }
        let start = self.next_index as f64 / self.info.fps();
        let frames = decode_frames(&self.info, start, count)?;
        tracing::debug!(start, decoded = frames.len(), "decoded video batch");
        self.pending.extend(frames);
        Ok(())
    }
}

impl FrameSource for VideoFileSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn capture(&mut self) -> FxResult<SourceFrame> {
        if self.next_index >= self.info.frame_count() {
            return Ok(SourceFrame::Ended);
        }
        if self.pending.is_empty() {
            self.refill()?;
        }
        let Some(data) = self.pending.pop_front() else {
            // decoder produced fewer frames than the container advertised
            return Ok(SourceFrame::Ended);
        };
        self.next_index += 1;
        Ok(SourceFrame::Ready(PixelBuffer::from_rgba(
            self.info.width,
            self.info.height,
            data,
        )?))
    }

    fn is_moving(&self) -> bool {
        true
    }

    fn duration(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.info.duration_sec).ok()
    }

    fn rewind(&mut self) -> FxResult<()> {
        self.next_index = 0;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(feature = "media-ffmpeg")]
pub fn probe_video(path: &Path) -> FxResult<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| FxError::validation(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(FxError::validation(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| FxError::serde(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FxError::validation("no video stream found"))?;
    let width = stream
        .width
        .ok_or_else(|| FxError::validation("missing video width from ffprobe"))?;
    let height = stream
        .height
        .ok_or_else(|| FxError::validation("missing video height from ffprobe"))?;
    let (fps_num, fps_den) = parse_ff_ratio(stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| FxError::validation("invalid video r_frame_rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_video(_path: &Path) -> FxResult<VideoInfo> {
    Err(FxError::validation(
        "video sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn decode_frames(info: &VideoInfo, start_sec: f64, count: u32) -> FxResult<Vec<Vec<u8>>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{start_sec:.9}")])
        .arg("-i")
        .arg(&info.path)
        .args([
            "-frames:v",
            &count.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| FxError::source_not_ready(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(FxError::source_not_ready(format!(
            "ffmpeg decode failed for '{}': {}",
            info.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let frame_len = info.width as usize * info.height as usize * 4;
    if frame_len == 0 || !out.stdout.len().is_multiple_of(frame_len) {
        return Err(FxError::effect(format!(
            "decoded batch has {} bytes, not a multiple of {frame_len}",
            out.stdout.len()
        )));
    }
    Ok(out
        .stdout
        .chunks_exact(frame_len)
        .take(count as usize)
        .map(<[u8]>::to_vec)
        .collect())
}

#[cfg(not(feature = "media-ffmpeg"))]
fn decode_frames(_info: &VideoInfo, _start_sec: f64, _count: u32) -> FxResult<Vec<Vec<u8>>> {
    Err(FxError::validation(
        "video sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg_attr(not(feature = "media-ffmpeg"), allow(dead_code))]
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}
