use crate::foundation::error::{FxError, FxResult};

/// Straight (non-premultiplied) RGBA8 pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Row-major RGBA8 frame, `data.len() == width * height * 4`.
///
/// Every effect reads one buffer and writes a fresh one; buffers are never
/// aliased between the read and write side of a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Transparent black buffer.
    pub fn new(width: u32, height: u32) -> FxResult<Self> {
        let len = expected_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    pub fn filled(width: u32, height: u32, px: Rgba) -> FxResult<Self> {
        let len = expected_len(width, height)?;
        let data = px.to_array().repeat(len / 4);
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> FxResult<Self> {
        let len = expected_len(width, height)?;
        if data.len() != len {
            return Err(FxError::validation(format!(
                "pixel data has {} bytes, expected {len} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `data` still matches the declared dimensions.
    pub fn len_matches(&self) -> bool {
        expected_len(self.width, self.height).is_ok_and(|len| len == self.data.len())
    }

    pub fn ensure_consistent(&self) -> FxResult<()> {
        if self.len_matches() {
            Ok(())
        } else {
            Err(FxError::effect(format!(
                "buffer size mismatch: {} bytes for {}x{}",
                self.data.len(),
                self.width,
                self.height
            )))
        }
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let i = self.index(x, y);
        Rgba::new(
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        )
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: Rgba) {
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&px.to_array());
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

fn expected_len(width: u32, height: u32) -> FxResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| FxError::validation("pixel buffer size overflow"))
}
