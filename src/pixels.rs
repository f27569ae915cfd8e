//! Per-pixel difference images.
//!
//! Both inputs are tightly packed RGBA8 buffers of the same width and
//! height; scaling images to a common size happens before they reach this
//! module (see [`crate::images::prepare`]). The result has the same
//! dimensions as the inputs.
//!
//! Two algorithms are available:
//!
//! - [`Algorithm::Perceptual`] marks pixels whose colour difference exceeds a
//!   perceptual threshold, ignoring anti-aliasing (see [`crate::perceptual`]).
//! - [`Algorithm::RawChannel`] reports the exact absolute difference of each
//!   colour channel, with the output alpha taken from the more opaque input.

use crate::error::{Error, Result};
use crate::perceptual::{self, PerceptualOptions};
use mlua::prelude::*;
use rayon::prelude::*;
use std::str::FromStr;

/// A rectangular RGBA8 image, row-major, four bytes per pixel, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wraps `data`, checking it holds exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::BufferLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a buffer whose length the caller has already established.
    #[inline]
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw RGBA bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The RGBA value at `(x, y)`, or `None` outside the image.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let pos = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[pos..pos + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// How to compare two images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Threshold-based comparison in YIQ space with anti-aliasing detection.
    #[default]
    Perceptual,
    /// Exact per-channel absolute difference.
    RawChannel,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "perceptual" => Ok(Self::Perceptual),
            "raw-channel" => Ok(Self::RawChannel),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A difference image and the number of pixels found to differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelDiff {
    pub image: ImageBuffer,

    /// Pixels reported as different. For the perceptual algorithm this
    /// excludes anti-aliased pixels unless they were asked for; for the raw
    /// algorithm it counts pixels with any differing colour channel.
    pub mismatched: u64,
}

fn check_dimensions(base: &ImageBuffer, overlay: &ImageBuffer) -> Result<()> {
    if base.width != overlay.width || base.height != overlay.height {
        return Err(Error::DimensionMismatch {
            base_width: base.width,
            base_height: base.height,
            overlay_width: overlay.width,
            overlay_height: overlay.height,
        });
    }
    Ok(())
}

/// Diffs two images with default perceptual options.
pub fn diff(base: &ImageBuffer, overlay: &ImageBuffer, algorithm: Algorithm) -> Result<PixelDiff> {
    diff_with(base, overlay, algorithm, &PerceptualOptions::default())
}

/// Diffs two images of identical dimensions.
///
/// `options` only affects [`Algorithm::Perceptual`]. Fails with
/// [`Error::DimensionMismatch`] if the sizes differ; images are never
/// cropped or stretched here.
pub fn diff_with(
    base: &ImageBuffer,
    overlay: &ImageBuffer,
    algorithm: Algorithm,
    options: &PerceptualOptions,
) -> Result<PixelDiff> {
    check_dimensions(base, overlay)?;

    let result = match algorithm {
        Algorithm::Perceptual => perceptual::diff(base, overlay, options),
        Algorithm::RawChannel => raw_channel_unchecked(base, overlay),
    };

    log::debug!(
        "{algorithm:?} diff of {}x{} image: {} pixels differ",
        base.width,
        base.height,
        result.mismatched
    );
    Ok(result)
}

/// Per-channel absolute difference of two images.
///
/// Output RGB is `|base - overlay|` per channel; output alpha is the larger
/// of the two input alphas, so a difference under a transparent pixel in one
/// image stays visible when the other image is opaque there. The operation
/// is symmetric in its two arguments.
pub fn raw_channel(base: &ImageBuffer, overlay: &ImageBuffer) -> Result<PixelDiff> {
    check_dimensions(base, overlay)?;
    Ok(raw_channel_unchecked(base, overlay))
}

fn raw_channel_unchecked(base: &ImageBuffer, overlay: &ImageBuffer) -> PixelDiff {
    let mut out = vec![0u8; base.data.len()];

    let mismatched = out
        .par_chunks_exact_mut(4)
        .zip(base.data.par_chunks_exact(4))
        .zip(overlay.data.par_chunks_exact(4))
        .map(|((dst, b), o)| {
            dst[0] = b[0].abs_diff(o[0]);
            dst[1] = b[1].abs_diff(o[1]);
            dst[2] = b[2].abs_diff(o[2]);
            dst[3] = b[3].max(o[3]);
            u64::from(dst[..3] != [0, 0, 0])
        })
        .sum();

    PixelDiff {
        image: ImageBuffer::from_parts(base.width, base.height, out),
        mismatched,
    }
}

impl FromLua for Algorithm {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        Ok(String::from_lua(value, lua)?.parse()?)
    }
}

/// Reads `{ width = w, height = h, data = "<rgba bytes>" }`.
impl FromLua for ImageBuffer {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        let table = LuaTable::from_lua(value, lua)?;
        let data = table.get::<LuaString>("data")?;
        Ok(Self::new(
            table.get("width")?,
            table.get("height")?,
            data.as_bytes().to_vec(),
        )?)
    }
}

impl IntoLua for ImageBuffer {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("width", self.width)?;
        table.set("height", self.height)?;
        table.set("data", lua.create_string(&self.data)?)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for PixelDiff {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("image", self.image.into_lua(lua)?)?;
        table.set("mismatched", self.mismatched)?;
        Ok(LuaValue::Table(table))
    }
}
