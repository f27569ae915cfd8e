//! Perceptual image comparison.
//!
//! Pixels are compared by their colour distance in YIQ space after blending
//! any transparency over white. A pixel whose distance exceeds the threshold
//! is a mismatch unless it looks like anti-aliasing: a pixel sitting on a
//! contrast edge whose darkest or brightest neighbour lies in a flat region
//! of both images. The output image shows:
//!
//! - mismatches in `diff_color` (or `diff_color_alt` where the overlay is
//!   darker than the base, if set)
//! - anti-aliased pixels in `aa_color`
//! - everything else as a faded grayscale copy of the base image
//!
//! With `diff_mask` set, only mismatches are drawn over a transparent
//! background.

use crate::pixels::{ImageBuffer, PixelDiff};
use mlua::prelude::*;
use rayon::prelude::*;

/// Squared YIQ distance between black and white, the largest possible delta.
const MAX_YIQ_DELTA: f64 = 35215.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PerceptualOptions {
    /// Matching threshold from 0 to 1; smaller is more sensitive.
    pub threshold: f64,

    /// Count anti-aliased pixels as mismatches instead of ignoring them.
    pub include_aa: bool,

    /// Opacity of the unchanged base pixels in the output.
    pub alpha: f64,

    pub aa_color: [u8; 3],

    pub diff_color: [u8; 3],

    /// Colour for mismatches where the overlay is darker than the base.
    pub diff_color_alt: Option<[u8; 3]>,

    /// Draw only mismatches, leaving every other pixel transparent.
    pub diff_mask: bool,
}

impl Default for PerceptualOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_aa: false,
            alpha: 0.1,
            aa_color: [255, 255, 0],
            diff_color: [255, 0, 0],
            diff_color_alt: None,
            diff_mask: false,
        }
    }
}

/// Reads an options table; absent fields, or a nil table, keep their defaults.
impl FromLua for PerceptualOptions {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        let defaults = Self::default();
        if value.is_nil() {
            return Ok(defaults);
        }
        let table = LuaTable::from_lua(value, lua)?;

        Ok(Self {
            threshold: table
                .get::<Option<f64>>("threshold")?
                .unwrap_or(defaults.threshold),
            include_aa: table
                .get::<Option<bool>>("include_aa")?
                .unwrap_or(defaults.include_aa),
            alpha: table.get::<Option<f64>>("alpha")?.unwrap_or(defaults.alpha),
            aa_color: table
                .get::<Option<[u8; 3]>>("aa_color")?
                .unwrap_or(defaults.aa_color),
            diff_color: table
                .get::<Option<[u8; 3]>>("diff_color")?
                .unwrap_or(defaults.diff_color),
            diff_color_alt: table.get("diff_color_alt")?,
            diff_mask: table
                .get::<Option<bool>>("diff_mask")?
                .unwrap_or(defaults.diff_mask),
        })
    }
}

/// Runs the comparison. Callers guarantee equal dimensions.
pub(crate) fn diff(
    base: &ImageBuffer,
    overlay: &ImageBuffer,
    options: &PerceptualOptions,
) -> PixelDiff {
    let width = base.width() as usize;
    let height = base.height() as usize;
    let img1 = base.data();
    let img2 = overlay.data();
    let mut out = vec![0u8; img1.len()];

    // Fast path, which also covers zero-sized images.
    if img1 == img2 {
        if !options.diff_mask {
            out.par_chunks_exact_mut(4)
                .zip(img1.par_chunks_exact(4))
                .for_each(|(dst, px)| draw_gray(dst, px, options.alpha));
        }
        return PixelDiff {
            image: ImageBuffer::from_parts(base.width(), base.height(), out),
            mismatched: 0,
        };
    }

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;

    let mismatched = out
        .par_chunks_mut(width * 4)
        .enumerate()
        .map(|(y, row)| {
            let mut count = 0;
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                let pos = (y * width + x) * 4;
                let delta = color_delta(img1, img2, pos, pos, false);

                if delta.abs() > max_delta {
                    if !options.include_aa
                        && (antialiased(img1, x, y, width, height, img2)
                            || antialiased(img2, x, y, width, height, img1))
                    {
                        if !options.diff_mask {
                            draw(dst, options.aa_color);
                        }
                    } else {
                        let color = match options.diff_color_alt {
                            Some(alt) if delta < 0.0 => alt,
                            _ => options.diff_color,
                        };
                        draw(dst, color);
                        count += 1;
                    }
                } else if !options.diff_mask {
                    draw_gray(dst, &img1[pos..pos + 4], options.alpha);
                }
            }
            count
        })
        .sum();

    PixelDiff {
        image: ImageBuffer::from_parts(base.width(), base.height(), out),
        mismatched,
    }
}

/// Whether the pixel at `(x1, y1)` of `img` is likely anti-aliasing.
fn antialiased(
    img: &[u8],
    x1: usize,
    y1: usize,
    width: usize,
    height: usize,
    img2: &[u8],
) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = (y1 * width + x1) * 4;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let (mut min, mut max) = (0.0, 0.0);
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }

            // Brightness delta against each neighbour.
            let delta = color_delta(img, img, pos, (y * width + x) * 4, true);

            if delta == 0.0 {
                zeroes += 1;
                // More than two identical neighbours: not on an edge.
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = x;
                min_y = y;
            } else if delta > max {
                max = delta;
                max_x = x;
                max_y = y;
            }
        }
    }

    // No darker or no brighter neighbour: not an edge.
    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(img2, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(img2, max_x, max_y, width, height))
}

/// Whether the pixel has more than two identical neighbours.
fn has_many_siblings(img: &[u8], x1: usize, y1: usize, width: usize, height: usize) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = (y1 * width + x1) * 4;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let pos2 = (y * width + x) * 4;
            if img[pos..pos + 4] == img[pos2..pos2 + 4] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

/// Squared YIQ distance between pixel `k` of `img1` and pixel `m` of `img2`.
///
/// Negative when the second pixel is darker. With `y_only`, returns the
/// signed brightness difference instead.
fn color_delta(img1: &[u8], img2: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let p1 = &img1[k..k + 4];
    let p2 = &img2[m..m + 4];
    if p1 == p2 {
        return 0.0;
    }

    let [r1, g1, b1] = blend_over_white(p1);
    let [r2, g2, b2] = blend_over_white(p2);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 { -delta } else { delta }
}

fn blend_over_white(px: &[u8]) -> [f64; 3] {
    let [r, g, b] = [f64::from(px[0]), f64::from(px[1]), f64::from(px[2])];
    if px[3] == 255 {
        return [r, g, b];
    }
    let a = f64::from(px[3]) / 255.0;
    [blend(r, a), blend(g, a), blend(b, a)]
}

#[inline]
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

#[inline]
fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

#[inline]
fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

#[inline]
fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

#[inline]
fn draw(dst: &mut [u8], [r, g, b]: [u8; 3]) {
    dst.copy_from_slice(&[r, g, b, 255]);
}

fn draw_gray(dst: &mut [u8], px: &[u8], alpha: f64) {
    let luma = rgb2y(f64::from(px[0]), f64::from(px[1]), f64::from(px[2]));
    let value = blend(luma, alpha * f64::from(px[3]) / 255.0)
        .round()
        .clamp(0.0, 255.0) as u8;
    draw(dst, [value, value, value]);
}
