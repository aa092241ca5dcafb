use crate::{
    effects::{EffectContext, glitch, pixel_sort, slit_scan},
    foundation::{core::PixelBuffer, error::FxResult},
    params::{Direction, EffectParameters},
};

pub const SLIT_SCAN_SHARE: f64 = 0.7;
pub const PIXEL_SORT_SHARE: f64 = 0.5;
pub const GLITCH_SHARE: f64 = 0.3;

/// Slit-scan, then pixel-sort over the warped frame, then glitch over that.
///
/// The sort stage is skipped for remap-only directions (wave, spiral). Any stage
/// error aborts the whole pass.
pub fn combined(
    src: &PixelBuffer,
    params: &EffectParameters,
    ctx: &mut EffectContext,
) -> FxResult<PixelBuffer> {
    let warped = slit_scan(
        src,
        &params.with_intensity(params.intensity * SLIT_SCAN_SHARE),
        ctx,
    )?;

    let sorted = match params.direction {
        Direction::Vertical | Direction::Horizontal | Direction::Radial => pixel_sort(
            &warped,
            &params.with_intensity(params.intensity * PIXEL_SORT_SHARE),
            ctx,
        )?,
        Direction::Wave | Direction::Spiral => warped,
    };

    glitch(&sorted, params.intensity * GLITCH_SHARE, &mut ctx.rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Rgba,
        params::{EffectKind, StretchKind},
    };

    #[test]
    fn zero_intensity_uniform_frame_is_unchanged() {
        let src = PixelBuffer::filled(6, 6, Rgba::new(40, 50, 60, 255)).unwrap();
        for &dir in Direction::ALL {
            let mut ctx = EffectContext::seeded(5);
            let params = EffectParameters::new(EffectKind::Combined, 0.0, dir)
                .with_stretch(StretchKind::Uniform, 0.0);
            assert_eq!(combined(&src, &params, &mut ctx).unwrap(), src);
            assert_eq!(ctx.frame(), 1);
        }
    }

    #[test]
    fn seeded_runs_match() {
        let mut src = PixelBuffer::new(24, 16).unwrap();
        for y in 0..16 {
            for x in 0..24 {
                src.set_pixel(x, y, Rgba::new((x * 10) as u8, (y * 15) as u8, 7, 255));
            }
        }
        let params = EffectParameters::new(EffectKind::Combined, 0.9, Direction::Vertical)
            .with_stretch(StretchKind::Random, 0.4);
        let a = combined(&src, &params, &mut EffectContext::seeded(11)).unwrap();
        let b = combined(&src, &params, &mut EffectContext::seeded(11)).unwrap();
        assert_eq!(a, b);
    }
}
