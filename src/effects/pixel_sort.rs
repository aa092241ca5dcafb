use std::f64::consts::PI;

use kurbo::{Point, Vec2};
use rand::{rngs::StdRng, seq::SliceRandom};

use crate::{
    color::{brightness, hue, saturation},
    effects::EffectContext,
    foundation::{
        core::{PixelBuffer, Rgba},
        error::{FxError, FxResult},
    },
    params::{Direction, EffectParameters},
};

/// Frames each sort key stays active before cycling to the next.
pub const KEY_CYCLE_FRAMES: u64 = 30;
pub const RADIAL_RAYS: u32 = 72;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Brightness,
    Hue,
    Saturation,
    Shuffle,
}

impl SortKey {
    pub fn for_frame(frame: u64) -> Self {
        match (frame / KEY_CYCLE_FRAMES) % 4 {
            0 => Self::Brightness,
            1 => Self::Hue,
            2 => Self::Saturation,
            _ => Self::Shuffle,
        }
    }

    fn key(self, px: Rgba) -> f64 {
        match self {
            Self::Brightness => brightness(px.r, px.g, px.b),
            Self::Hue => hue(px.r, px.g, px.b),
            Self::Saturation => saturation(px.r, px.g, px.b),
            Self::Shuffle => 0.0,
        }
    }
}

/// Slice spacing: higher intensity sorts more slices.
pub fn slice_step(intensity: f64) -> u32 {
    ((10.0 * intensity).floor() as u32).max(1)
}

/// Permutes pixel content within columns, rows or radial rays.
///
/// Column and row passes pick the key from the frame clock; rays always sort
/// by brightness. Wave and spiral are remap-only directions and are rejected.
pub fn pixel_sort(
    src: &PixelBuffer,
    params: &EffectParameters,
    ctx: &mut EffectContext,
) -> FxResult<PixelBuffer> {
    src.ensure_consistent()?;
    let mut out = src.clone();
    if src.is_empty() {
        return Ok(out);
    }

    let step = slice_step(params.intensity) as usize;
    let key = SortKey::for_frame(ctx.clock.current());

    match params.direction {
        Direction::Vertical => {
            for x in (0..src.width).step_by(step) {
                let mut column = (0..src.height).map(|y| src.pixel(x, y)).collect::<Vec<_>>();
                sort_slice(&mut column, key, &mut ctx.rng);
                for (y, px) in (0..src.height).zip(column) {
                    out.set_pixel(x, y, px);
                }
            }
        }
        Direction::Horizontal => {
            for y in (0..src.height).step_by(step) {
                let mut row = (0..src.width).map(|x| src.pixel(x, y)).collect::<Vec<_>>();
                sort_slice(&mut row, key, &mut ctx.rng);
                for (x, px) in (0..src.width).zip(row) {
                    out.set_pixel(x, y, px);
                }
            }
        }
        Direction::Radial => sort_rays(src, &mut out),
        Direction::Wave | Direction::Spiral => {
            return Err(FxError::effect(format!(
                "pixel sort does not implement direction '{}'",
                params.direction
            )));
        }
    }

    Ok(out)
}

/// Stable for every key except [`SortKey::Shuffle`].
fn sort_slice(slice: &mut Vec<Rgba>, key: SortKey, rng: &mut StdRng) {
    if key == SortKey::Shuffle {
        slice.shuffle(rng);
        return;
    }
    let mut keyed = slice
        .iter()
        .map(|&px| (key.key(px), px))
        .collect::<Vec<_>>();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    slice.clear();
    slice.extend(keyed.into_iter().map(|(_, px)| px));
}

/// Pixel positions of each ray, walking outward from the center.
///
/// Every pixel belongs to at most one ray: the first ray to reach it claims
/// it, so the center and cells revisited by diagonal steps appear once.
fn ray_positions(width: u32, height: u32) -> Vec<Vec<(u32, u32)>> {
    let center = Point::new(f64::from(width) / 2.0, f64::from(height) / 2.0);
    let reach = width.max(height);
    let (w, h) = (f64::from(width), f64::from(height));
    let mut claimed = vec![false; width as usize * height as usize];

    (0..RADIAL_RAYS)
        .map(|ray| {
            let dir = Vec2::from_angle(f64::from(ray * 5) * PI / 180.0);
            let mut positions = Vec::new();
            for r in 0..reach {
                let p = center + dir * f64::from(r);
                if !(p.x >= 0.0 && p.x < w && p.y >= 0.0 && p.y < h) {
                    continue;
                }
                let (x, y) = (p.x.floor() as u32, p.y.floor() as u32);
                let cell = y as usize * width as usize + x as usize;
                if !claimed[cell] {
                    claimed[cell] = true;
                    positions.push((x, y));
                }
            }
            positions
        })
        .collect()
}

fn sort_rays(src: &PixelBuffer, out: &mut PixelBuffer) {
    for positions in ray_positions(src.width, src.height) {
        let mut pixels = positions
            .iter()
            .map(|&(x, y)| {
                let px = src.pixel(x, y);
                (brightness_of(px), px)
            })
            .collect::<Vec<_>>();
        pixels.sort_by(|a, b| a.0.total_cmp(&b.0));
        for ((x, y), (_, px)) in positions.into_iter().zip(pixels) {
            out.set_pixel(x, y, px);
        }
    }
}

fn brightness_of(px: Rgba) -> f64 {
    brightness(px.r, px.g, px.b)
}
