use std::{path::Path, time::Duration};

use anyhow::Context as _;

use crate::foundation::{
    core::PixelBuffer,
    error::{FxError, FxResult},
};

/// Result of one non-blocking capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceFrame {
    Ready(PixelBuffer),
    /// Transient; the caller retries after a short delay.
    NotReady,
    /// End of stream for moving sources.
    Ended,
}

/// Frame provider consumed by the engine. `capture` must not block
/// indefinitely.
pub trait FrameSource: Send {
    fn dimensions(&self) -> (u32, u32);

    fn capture(&mut self) -> FxResult<SourceFrame>;

    /// Video or camera. Stills render only on demand.
    fn is_moving(&self) -> bool {
        false
    }

    /// Natural playback length, when the source has one.
    fn duration(&self) -> Option<Duration> {
        None
    }

    fn rewind(&mut self) -> FxResult<()> {
        Ok(())
    }
}

/// A single decoded image.
#[derive(Clone, Debug)]
pub struct StillSource {
    frame: PixelBuffer,
}

impl StillSource {
    pub fn new(frame: PixelBuffer) -> FxResult<Self> {
        frame.ensure_consistent()?;
        if frame.is_empty() {
            return Err(FxError::validation("still source must be non-empty"));
        }
        Ok(Self { frame })
    }

    pub fn from_encoded(bytes: &[u8]) -> FxResult<Self> {
        let rgba = image::load_from_memory(bytes)
            .context("decode image from memory")?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(PixelBuffer::from_rgba(width, height, rgba.into_raw())?)
    }

    pub fn open(path: &Path) -> FxResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
        Self::from_encoded(&bytes)
    }

    pub fn frame(&self) -> &PixelBuffer {
        &self.frame
    }
}

impl FrameSource for StillSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn capture(&mut self) -> FxResult<SourceFrame> {
        Ok(SourceFrame::Ready(self.frame.clone()))
    }
}

/// In-memory frame stream played back one frame per capture.
///
/// The first `warmup` captures report [`SourceFrame::NotReady`], mimicking a
/// player that has not buffered its first frame yet.
#[derive(Clone, Debug)]
pub struct SequenceSource {
    frames: Vec<PixelBuffer>,
    fps: f64,
    pos: usize,
    warmup: u32,
}

impl SequenceSource {
    pub fn new(frames: Vec<PixelBuffer>, fps: f64) -> FxResult<Self> {
        let Some(first) = frames.first() else {
            return Err(FxError::validation("sequence source needs at least one frame"));
        };
        if !fps.is_finite() || fps <= 0.0 {
            return Err(FxError::validation("sequence fps must be finite and > 0"));
        }
        for f in &frames {
            f.ensure_consistent()?;
            if !f.same_shape(first) {
                return Err(FxError::validation(format!(
                    "sequence frames must share one size: {}x{} vs {}x{}",
                    f.width, f.height, first.width, first.height
                )));
            }
        }
        Ok(Self {
            frames,
            fps,
            pos: 0,
            warmup: 0,
        })
    }

    pub fn with_warmup(mut self, captures: u32) -> Self {
        self.warmup = captures;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for SequenceSource {
    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map_or((0, 0), |f| (f.width, f.height))
    }

    fn capture(&mut self) -> FxResult<SourceFrame> {
        if self.warmup > 0 {
            self.warmup -= 1;
            return Ok(SourceFrame::NotReady);
        }
        match self.frames.get(self.pos) {
            Some(frame) => {
                self.pos += 1;
                Ok(SourceFrame::Ready(frame.clone()))
            }
            None => Ok(SourceFrame::Ended),
        }
    }

    fn is_moving(&self) -> bool {
        true
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.frames.len() as f64 / self.fps))
    }

    fn rewind(&mut self) -> FxResult<()> {
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::foundation::core::Rgba;

    #[test]
    fn still_decodes_png_without_premultiplying() {
        let img = image::RgbaImage::from_raw(1, 1, vec![100u8, 50, 200, 128]).unwrap();
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let mut src = StillSource::from_encoded(&bytes).unwrap();
        assert_eq!(src.dimensions(), (1, 1));
        let SourceFrame::Ready(frame) = src.capture().unwrap() else {
            panic!("still source should always be ready");
        };
        assert_eq!(frame.data, vec![100, 50, 200, 128]);
        assert!(!src.is_moving());
    }

    #[test]
    fn sequence_warms_up_plays_and_ends() {
        let a = PixelBuffer::filled(2, 2, Rgba::BLACK).unwrap();
        let b = PixelBuffer::filled(2, 2, Rgba::WHITE).unwrap();
        let mut src = SequenceSource::new(vec![a.clone(), b.clone()], 30.0)
            .unwrap()
            .with_warmup(1);

        assert_eq!(src.capture().unwrap(), SourceFrame::NotReady);
        assert_eq!(src.capture().unwrap(), SourceFrame::Ready(a.clone()));
        assert_eq!(src.capture().unwrap(), SourceFrame::Ready(b));
        assert_eq!(src.capture().unwrap(), SourceFrame::Ended);
        src.rewind().unwrap();
        assert_eq!(src.capture().unwrap(), SourceFrame::Ready(a));
        assert_eq!(src.duration(), Some(Duration::from_secs_f64(2.0 / 30.0)));
    }

    #[test]
    fn sequence_rejects_mixed_sizes() {
        let a = PixelBuffer::filled(2, 2, Rgba::BLACK).unwrap();
        let b = PixelBuffer::filled(3, 2, Rgba::BLACK).unwrap();
        assert!(SequenceSource::new(vec![a, b], 30.0).is_err());
        assert!(SequenceSource::new(vec![], 30.0).is_err());
    }
}
