use kurbo::Rect;
use rand::{Rng, rngs::StdRng};

use crate::foundation::{
    core::{PixelBuffer, Rgba},
    error::FxResult,
};

pub const MAX_BLOCKS: f64 = 20.0;
const BLOCK_WIDTH: std::ops::Range<u32> = 10..60;
const BLOCK_HEIGHT: std::ops::Range<u32> = 5..25;

/// Black block count for `intensity`.
pub fn block_count(intensity: f64) -> usize {
    (intensity * MAX_BLOCKS).floor().max(0.0) as usize
}

/// White scanline count for `intensity`.
pub fn scanline_count(intensity: f64) -> usize {
    (intensity * MAX_BLOCKS / 2.0).floor().max(0.0) as usize
}

/// Paints random black blocks, then random full-width white scanlines.
///
/// Consumes `rng` in a fixed order (block x, y, width, height per block, then
/// one row per scanline), so a seeded generator reproduces the output exactly.
pub fn glitch(src: &PixelBuffer, intensity: f64, rng: &mut StdRng) -> FxResult<PixelBuffer> {
    src.ensure_consistent()?;
    let mut out = src.clone();
    if src.is_empty() {
        return Ok(out);
    }

    let bounds = Rect::new(0.0, 0.0, f64::from(src.width), f64::from(src.height));
    for _ in 0..block_count(intensity) {
        let x = rng.random_range(0..src.width);
        let y = rng.random_range(0..src.height);
        let w = rng.random_range(BLOCK_WIDTH);
        let h = rng.random_range(BLOCK_HEIGHT);
        let block = Rect::new(
            f64::from(x),
            f64::from(y),
            f64::from(x) + f64::from(w),
            f64::from(y) + f64::from(h),
        )
        .intersect(bounds);
        fill_rect(&mut out, block, Rgba::BLACK);
    }

    for _ in 0..scanline_count(intensity) {
        let y = rng.random_range(0..src.height);
        for x in 0..src.width {
            out.set_pixel(x, y, Rgba::WHITE);
        }
    }

    Ok(out)
}

fn fill_rect(buf: &mut PixelBuffer, rect: Rect, px: Rgba) {
    // rect is already clipped to integer buffer bounds
    let (x0, y0) = (rect.x0 as u32, rect.y0 as u32);
    let (x1, y1) = (rect.x1 as u32, rect.y1 as u32);
    for y in y0..y1 {
        for x in x0..x1 {
            buf.set_pixel(x, y, px);
        }
    }
}
