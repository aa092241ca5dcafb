//! Pixel-transform algorithms.
//!
//! Every pass reads one [`PixelBuffer`] and returns a fresh one. The only state
//! carried between passes lives in [`EffectContext`]: the frame counter that
//! phases the slit-scan waves, and the random source used by glitch, random
//! stretch and shuffle sorting.

pub mod combined;
pub mod glitch;
pub mod pixel_sort;
pub mod slit_scan;

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    foundation::{core::PixelBuffer, error::FxResult},
    params::{EffectKind, EffectParameters},
};

pub use combined::combined;
pub use glitch::glitch;
pub use pixel_sort::{SortKey, pixel_sort};
pub use slit_scan::slit_scan;

/// Monotonic count of completed slit-scan passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameClock {
    current: u64,
}

impl FrameClock {
    pub fn new(current: u64) -> Self {
        Self { current }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = self.current.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}

/// Per-session effect state. One instance per preview session and one per
/// recording session; never shared between them.
#[derive(Clone, Debug)]
pub struct EffectContext {
    pub clock: FrameClock,
    pub rng: StdRng,
}

impl EffectContext {
    pub fn seeded(seed: u64) -> Self {
        Self {
            clock: FrameClock::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            clock: FrameClock::default(),
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn frame(&self) -> u64 {
        self.clock.current()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectOutcome {
    pub buffer: PixelBuffer,
    /// The pass failed and `buffer` is an unmodified copy of the source.
    pub fell_back: bool,
}

/// Runs the selected effect, containing any failure to this frame.
///
/// Unsupported effect/direction pairs pass the source through without counting
/// as a fallback.
#[tracing::instrument(skip(src, ctx), fields(frame = ctx.frame()))]
pub fn apply_effect(
    src: &PixelBuffer,
    params: &EffectParameters,
    ctx: &mut EffectContext,
) -> EffectOutcome {
    let params = params.clamped();
    if !params.is_supported() {
        tracing::debug!(
            effect = %params.effect,
            direction = %params.direction,
            "direction not implemented for effect; passing source through"
        );
        return EffectOutcome {
            buffer: src.clone(),
            fell_back: false,
        };
    }

    match dispatch(src, &params, ctx) {
        Ok(buffer) => EffectOutcome {
            buffer,
            fell_back: false,
        },
        Err(err) => {
            tracing::warn!(effect = %params.effect, error = %err, "effect failed; presenting source");
            EffectOutcome {
                buffer: src.clone(),
                fell_back: true,
            }
        }
    }
}

fn dispatch(
    src: &PixelBuffer,
    params: &EffectParameters,
    ctx: &mut EffectContext,
) -> FxResult<PixelBuffer> {
    src.ensure_consistent()?;
    match params.effect {
        EffectKind::SlitScan => slit_scan(src, params, ctx),
        EffectKind::PixelSort => pixel_sort(src, params, ctx),
        EffectKind::Glitch => glitch(src, params.intensity, &mut ctx.rng),
        EffectKind::Combined => combined(src, params, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Rgba,
        params::{Direction, StretchKind},
    };

    #[test]
    fn truncated_buffer_falls_back_to_source() {
        let mut src = PixelBuffer::filled(4, 4, Rgba::WHITE).unwrap();
        src.data.truncate(10);
        let mut ctx = EffectContext::seeded(1);
        let params = EffectParameters::new(EffectKind::SlitScan, 0.5, Direction::Vertical);

        let out = apply_effect(&src, &params, &mut ctx);
        assert!(out.fell_back);
        assert_eq!(out.buffer, src);
        assert_eq!(ctx.frame(), 0);
    }

    #[test]
    fn unsupported_pair_is_pass_through() {
        let src = PixelBuffer::filled(3, 3, Rgba::new(9, 8, 7, 255)).unwrap();
        let mut ctx = EffectContext::seeded(1);
        let params = EffectParameters::new(EffectKind::PixelSort, 1.0, Direction::Spiral)
            .with_stretch(StretchKind::Uniform, 1.0);

        let out = apply_effect(&src, &params, &mut ctx);
        assert!(!out.fell_back);
        assert_eq!(out.buffer, src);
    }

    #[test]
    fn slit_scan_advances_clock_once() {
        let src = PixelBuffer::filled(5, 5, Rgba::BLACK).unwrap();
        let mut ctx = EffectContext::seeded(3);
        let params = EffectParameters::new(EffectKind::SlitScan, 0.8, Direction::Wave);
        apply_effect(&src, &params, &mut ctx);
        apply_effect(&src, &params, &mut ctx);
        assert_eq!(ctx.frame(), 2);
    }
}
