use crate::foundation::core::{PixelBuffer, Rgba};

/// Mean of the color channels, in `[0, 255]`.
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    (f64::from(r) + f64::from(g) + f64::from(b)) / 3.0
}

/// HSV hue in degrees, `[0, 360)`. Gray pixels (all channels equal) map to 0.
pub fn hue(r: u8, g: u8, b: u8) -> f64 {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0.0;
    }

    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    let deg = h * 60.0;
    if deg >= 360.0 { deg - 360.0 } else { deg }
}

/// HSV saturation, `(max - min) / max`, in `[0, 1]`. Black maps to 0.
pub fn saturation(r: u8, g: u8, b: u8) -> f64 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return 0.0;
    }
    f64::from(max - min) / f64::from(max)
}

/// Nearest-neighbor lookup: floors, then clamps into the buffer.
///
/// This is the only read path effects use for displaced coordinates, so any
/// finite or non-finite input lands on a valid pixel. NaN maps to 0.
pub fn sample_clamped(buf: &PixelBuffer, x: f64, y: f64) -> Rgba {
    let xi = clamp_floor(x, buf.width);
    let yi = clamp_floor(y, buf.height);
    buf.pixel(xi, yi)
}

fn clamp_floor(v: f64, extent: u32) -> u32 {
    let hi = extent.saturating_sub(1);
    // `as` saturates and maps NaN to 0.
    let f = v.floor();
    if f <= 0.0 {
        0
    } else if f >= f64::from(hi) {
        hi
    } else {
        f as u32
    }
}
