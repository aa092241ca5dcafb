use crate::{
    foundation::error::FxResult,
    recording::{RecordedFrame, Recording},
};

/// Handed to a [`FrameSink`] before the first frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Consumer of recorded frames.
///
/// Ordering contract: `push_frame` is called with strictly increasing indices
/// and non-decreasing timestamps, between exactly one `begin` and one `end`.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> FxResult<()>;
    fn push_frame(&mut self, idx: usize, frame: &RecordedFrame) -> FxResult<()>;
    fn end(&mut self) -> FxResult<()>;
}

/// Keeps frames in memory. Used by tests and by callers that package output
/// themselves.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(usize, RecordedFrame)>,
    ended: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(usize, RecordedFrame)] {
        &self.frames
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> FxResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: usize, frame: &RecordedFrame) -> FxResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> FxResult<()> {
        self.ended = true;
        Ok(())
    }
}

/// Streams a finished recording through `sink` in order.
pub fn write_recording(rec: &Recording, sink: &mut dyn FrameSink) -> FxResult<()> {
    let Some((width, height)) = rec.dimensions() else {
        return Err(crate::foundation::error::FxError::validation(
            "recording has no frames",
        ));
    };
    sink.begin(SinkConfig {
        width,
        height,
        fps: rec.fps,
    })?;
    for (idx, frame) in rec.frames.iter().enumerate() {
        sink.push_frame(idx, frame)?;
    }
    sink.end()
}
