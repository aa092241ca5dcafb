use kurbo::{Affine, Point, Vec2};
use rand::{Rng, rngs::StdRng};

use crate::{
    color::sample_clamped,
    effects::EffectContext,
    foundation::{
        core::PixelBuffer,
        error::{FxError, FxResult},
    },
    params::{Direction, EffectParameters, StretchKind},
};

/// Per-axis wave amplitude (pixels at full intensity) for vertical/horizontal slits.
const SLIT_WAVE_AMPLITUDE: f64 = 50.0;
/// Per-axis wave amplitude for the two-axis wave remap.
const WAVE_AMPLITUDE: f64 = 30.0;
/// Radians of extra rotation per pixel of distance, at full intensity.
const SPIRAL_TWIST: f64 = 0.01;

/// Resamples every output pixel from a displaced source position.
///
/// Advances the frame clock once on success. On error the clock is left
/// untouched.
pub fn slit_scan(
    src: &PixelBuffer,
    params: &EffectParameters,
    ctx: &mut EffectContext,
) -> FxResult<PixelBuffer> {
    src.ensure_consistent()?;
    if src.is_empty() {
        ctx.clock.advance();
        return Ok(src.clone());
    }

    let frame = ctx.clock.current() as f64;
    let field = StretchField::new(src, params.stretch_kind, params.stretch_amount);
    let intensity = params.intensity;

    let out = match params.direction {
        Direction::Vertical => {
            // stretch and wave are per column
            let cols = (0..src.width)
                .map(|x| {
                    let x = f64::from(x);
                    let scale = 1.0 + field.factor(x, 0.0, &mut ctx.rng);
                    let wave = (x * 0.01 + frame * 0.05).sin() * intensity * SLIT_WAVE_AMPLITUDE;
                    (scale, wave)
                })
                .collect::<Vec<_>>();
            remap(src, |x, y| {
                let (scale, wave) = cols[x as usize];
                (f64::from(x), f64::from(y) * scale + wave)
            })?
        }
        Direction::Horizontal => {
            let rows = (0..src.height)
                .map(|y| {
                    let y = f64::from(y);
                    let scale = 1.0 + field.factor(0.0, y, &mut ctx.rng);
                    let wave = (y * 0.01 + frame * 0.05).sin() * intensity * SLIT_WAVE_AMPLITUDE;
                    (scale, wave)
                })
                .collect::<Vec<_>>();
            remap(src, |x, y| {
                let (scale, wave) = rows[y as usize];
                (f64::from(x) * scale + wave, f64::from(y))
            })?
        }
        Direction::Radial => {
            let center = field.center;
            let rng = &mut ctx.rng;
            remap(src, |x, y| {
                let p = Point::new(f64::from(x), f64::from(y));
                let scale = 1.0 + field.factor(p.x, p.y, rng);
                let s = center + (p - center) * scale;
                (s.x, s.y)
            })?
        }
        Direction::Wave => {
            let rng = &mut ctx.rng;
            remap(src, |x, y| {
                let (xf, yf) = (f64::from(x), f64::from(y));
                let scale = 1.0 + field.factor(xf, yf, rng);
                let wave_x = (yf * 0.02 + frame * 0.03).sin() * intensity * WAVE_AMPLITUDE;
                let wave_y = (xf * 0.02 + frame * 0.04).cos() * intensity * WAVE_AMPLITUDE;
                (xf + wave_x, yf * scale + wave_y)
            })?
        }
        Direction::Spiral => {
            let center = field.center;
            let rng = &mut ctx.rng;
            remap(src, |x, y| {
                let p = Point::new(f64::from(x), f64::from(y));
                let d = p - center;
                let scale = 1.0 + field.factor(p.x, p.y, rng);
                let twist = d.hypot() * SPIRAL_TWIST * intensity;
                let rotated = rotate(d, twist);
                let s = center + rotated * scale;
                (s.x, s.y)
            })?
        }
    };

    ctx.clock.advance();
    Ok(out)
}

fn rotate(v: Vec2, theta: f64) -> Vec2 {
    if theta == 0.0 {
        return v;
    }
    (Affine::rotate(theta) * v.to_point()).to_vec2()
}

/// Builds a new buffer by sampling `src` at `f(x, y)` for every output pixel.
fn remap(
    src: &PixelBuffer,
    mut f: impl FnMut(u32, u32) -> (f64, f64),
) -> FxResult<PixelBuffer> {
    let mut data = Vec::with_capacity(src.data.len());
    for y in 0..src.height {
        for x in 0..src.width {
            let (sx, sy) = f(x, y);
            if !sx.is_finite() || !sy.is_finite() {
                return Err(FxError::effect(format!(
                    "non-finite source coordinate for output pixel ({x},{y})"
                )));
            }
            data.extend_from_slice(&sample_clamped(src, sx, sy).to_array());
        }
    }
    PixelBuffer::from_rgba(src.width, src.height, data)
}

/// Spatial stretch response over one frame.
pub(crate) struct StretchField {
    kind: StretchKind,
    amount: f64,
    width: f64,
    height: f64,
    center: Point,
}

impl StretchField {
    pub(crate) fn new(src: &PixelBuffer, kind: StretchKind, amount: f64) -> Self {
        let width = f64::from(src.width);
        let height = f64::from(src.height);
        Self {
            kind,
            amount,
            width,
            height,
            center: Point::new(width / 2.0, height / 2.0),
        }
    }

    /// Stretch factor at `(x, y)`; `sourceCoord = coord * (1 + factor)`.
    pub(crate) fn factor(&self, x: f64, y: f64, rng: &mut StdRng) -> f64 {
        let s = self.amount;
        if s == 0.0 && self.kind != StretchKind::Random {
            return 0.0;
        }
        match self.kind {
            StretchKind::Uniform => s,
            StretchKind::Gradient => s * (x / self.width + y / self.height) / 2.0,
            StretchKind::Random => s * (0.5 + rng.random::<f64>() * 0.5),
            StretchKind::Center => {
                let max = self.center.to_vec2().hypot();
                let d = (Point::new(x, y) - self.center).hypot();
                s * (1.0 - d / max)
            }
            StretchKind::Edges => {
                let edge = x.min(y).min(self.width - x).min(self.height - y);
                let max = self.center.x.min(self.center.y);
                s * (edge / max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{foundation::core::Rgba, params::EffectKind};

    fn ramp(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                buf.set_pixel(x, y, Rgba::new(x as u8, y as u8, (x * y) as u8, 255));
            }
        }
        buf
    }

    #[test]
    fn zero_intensity_and_stretch_is_identity_for_every_direction() {
        let src = ramp(9, 7);
        for &dir in Direction::ALL {
            let mut ctx = EffectContext::seeded(0);
            let params = EffectParameters::new(EffectKind::SlitScan, 0.0, dir);
            let out = slit_scan(&src, &params, &mut ctx).unwrap();
            assert_eq!(out, src, "direction {dir}");
        }
    }

    #[test]
    fn uniform_vertical_stretch_pulls_from_below() {
        let src = ramp(4, 8);
        let mut ctx = EffectContext::seeded(0);
        let params = EffectParameters::new(EffectKind::SlitScan, 0.0, Direction::Vertical)
            .with_stretch(StretchKind::Uniform, 1.0);
        let out = slit_scan(&src, &params, &mut ctx).unwrap();
        // y * 2, clamped to the last row
        assert_eq!(out.pixel(1, 2), src.pixel(1, 4));
        assert_eq!(out.pixel(1, 6), src.pixel(1, 7));
    }

    #[test]
    fn edges_factor_is_zero_on_border() {
        let src = ramp(10, 10);
        let field = StretchField::new(&src, StretchKind::Edges, 1.0);
        let mut rng = EffectContext::seeded(0).rng;
        assert_eq!(field.factor(0.0, 4.0, &mut rng), 0.0);
        assert!((field.factor(5.0, 5.0, &mut rng) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn center_factor_peaks_at_center() {
        let src = ramp(10, 10);
        let field = StretchField::new(&src, StretchKind::Center, 0.5);
        let mut rng = EffectContext::seeded(0).rng;
        assert!((field.factor(5.0, 5.0, &mut rng) - 0.5).abs() < 1e-12);
        assert!(field.factor(0.0, 0.0, &mut rng).abs() < 1e-12);
    }

    #[test]
    fn empty_buffer_still_counts_as_a_frame() {
        let src = PixelBuffer::new(0, 0).unwrap();
        let mut ctx = EffectContext::seeded(0);
        let params = EffectParameters::new(EffectKind::SlitScan, 1.0, Direction::Spiral);
        let out = slit_scan(&src, &params, &mut ctx).unwrap();
        assert!(out.is_empty());
        assert_eq!(ctx.frame(), 1);
    }
}
