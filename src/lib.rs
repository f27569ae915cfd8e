//! # pairdiff
//!
//! Computation backend for a side-by-side text and image comparison viewer.
//!
//! This crate provides Lua bindings for the parts of a comparison view that
//! do real work: counting how many lines a set of diff chunks added and
//! removed, and computing per-pixel difference images. The text diff itself
//! comes from the editor's merge engine; this crate only consumes its chunk
//! list.
//!
//! ## Architecture
//!
//! - `lines` - Mapping UTF-16 positions to line numbers
//! - `stats` - Added/removed line counts from merge chunks
//! - `pixels` - Image buffers and the raw channel-wise difference
//! - `perceptual` - Threshold-based difference with anti-aliasing detection
//! - `images` - Decoding, letterbox sizing and resampling of image files
//! - `memo` - Identity-keyed memoization used by the image loader
//! - `bytes` - Human-readable file sizes
//! - `error` - The crate error type
//! - `lib` (this module) - Lua bindings
//!
//! ## Usage from Lua
//!
//! ```lua
//! local pairdiff = require("pairdiff")
//!
//! -- Line counts for the merge view's chunks
//! local stats = pairdiff.compute_stats(view.chunks, original, modified)
//! print(stats.additions, stats.removals)
//!
//! -- Difference image from two RGBA buffers of equal size
//! local result = pairdiff.pixel_diff(
//!   { width = 2, height = 1, data = base_bytes },
//!   { width = 2, height = 1, data = overlay_bytes },
//!   "raw-channel"
//! )
//!
//! -- Straight from files, written out as PNG
//! pairdiff.diff_files("before.png", "after.png", { output = "diff.png" })
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG` - Log filter for messages written to stderr (default `warn`)

use mlua::prelude::*;
use std::path::Path;
use std::sync::Arc;

pub mod bytes;
pub mod error;
pub mod images;
pub mod lines;
pub mod memo;
pub mod perceptual;
pub mod pixels;
pub mod stats;

use crate::lines::LineEnding;
use crate::perceptual::PerceptualOptions;
use crate::pixels::{Algorithm, ImageBuffer};
use crate::stats::{Chunk, StatsOptions};

/// Options accepted by `diff_files`, all read from one Lua table.
struct DiffFilesOptions {
    algorithm: Algorithm,
    /// Where to write the difference image as PNG.
    output: Option<String>,
    canvas: Option<(u32, u32)>,
    perceptual: PerceptualOptions,
}

impl FromLua for DiffFilesOptions {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        if value.is_nil() {
            return Ok(Self {
                algorithm: Algorithm::default(),
                output: None,
                canvas: None,
                perceptual: PerceptualOptions::default(),
            });
        }
        let table = LuaTable::from_lua(value, lua)?;

        Ok(Self {
            algorithm: table
                .get::<Option<Algorithm>>("algorithm")?
                .unwrap_or_default(),
            output: table.get("output")?,
            canvas: canvas(table.get("canvas_width")?, table.get("canvas_height")?),
            perceptual: PerceptualOptions::from_lua(LuaValue::Table(table), lua)?,
        })
    }
}

/// A canvas size, only when both sides are given.
#[inline]
fn canvas(width: Option<u32>, height: Option<u32>) -> Option<(u32, u32)> {
    width.zip(height)
}

/// Wraps both paths for the image loader. Equal paths share one `Arc`, so
/// comparing a file with itself decodes it once.
fn shared_paths(base: &str, overlay: &str) -> (Arc<Path>, Arc<Path>) {
    let base_path: Arc<Path> = Arc::from(Path::new(base));
    let overlay_path = if base == overlay {
        Arc::clone(&base_path)
    } else {
        Arc::from(Path::new(overlay))
    };
    (base_path, overlay_path)
}

/// Returns `{ number, text }` for the line containing a UTF-16 position.
fn line_at(lua: &Lua, (text, position, ending): (String, usize, Option<LineEnding>)) -> LuaResult<LuaValue> {
    lines::line_at(&text, position, &ending.unwrap_or_default()).into_lua(lua)
}

/// Returns the zero-based line index, or nil past the end of the text.
fn find_line_index(
    _: &Lua,
    (text, position, ending): (String, usize, Option<LineEnding>),
) -> LuaResult<Option<usize>> {
    Ok(lines::find_line_index(
        &text,
        position,
        &ending.unwrap_or_default(),
    ))
}

fn count_affected_lines(
    _: &Lua,
    (text, from, to, ending): (String, usize, usize, Option<LineEnding>),
) -> LuaResult<usize> {
    Ok(stats::count_affected_lines(
        &text,
        from,
        to,
        &ending.unwrap_or_default(),
    )?)
}

/// Returns `{ additions, removals }` for a list of `{ fromA, toA, fromB, toB }` chunks.
fn compute_stats(
    lua: &Lua,
    (chunks, text_a, text_b, options): (Vec<Chunk>, String, String, StatsOptions),
) -> LuaResult<LuaValue> {
    stats::compute_stats(&chunks, &text_a, &text_b, &options.line_ending)?.into_lua(lua)
}

/// Same as `compute_stats`, with the chunks given as JSON.
fn compute_stats_json(
    lua: &Lua,
    (json, text_a, text_b, options): (String, String, String, StatsOptions),
) -> LuaResult<LuaValue> {
    let chunks = stats::parse_chunks(&json)?;
    stats::compute_stats(&chunks, &text_a, &text_b, &options.line_ending)?.into_lua(lua)
}

/// Returns `{ additions, removals, original_lines, modified_lines }`.
fn summarize(
    lua: &Lua,
    (chunks, text_a, text_b, options): (Vec<Chunk>, String, String, StatsOptions),
) -> LuaResult<LuaValue> {
    stats::summarize(&chunks, &text_a, &text_b, &options.line_ending)?.into_lua(lua)
}

/// Diffs two `{ width, height, data }` RGBA buffers.
fn pixel_diff(
    lua: &Lua,
    (base, overlay, algorithm, options): (
        ImageBuffer,
        ImageBuffer,
        Option<Algorithm>,
        PerceptualOptions,
    ),
) -> LuaResult<LuaValue> {
    pixels::diff_with(&base, &overlay, algorithm.unwrap_or_default(), &options)?.into_lua(lua)
}

/// Loads, letterboxes and diffs two image files, optionally writing the
/// result as PNG.
fn diff_files(
    lua: &Lua,
    (base, overlay, options): (String, String, DiffFilesOptions),
) -> LuaResult<LuaValue> {
    let (base_path, overlay_path) = shared_paths(&base, &overlay);
    let mut loader = images::ImageLoader::default();

    let result = images::diff_files(
        &mut loader,
        &base_path,
        &overlay_path,
        options.algorithm,
        &options.perceptual,
        options.canvas,
    )?;

    if let Some(output) = &options.output {
        images::save_png(&result.image, Path::new(output))?;
    }

    result.into_lua(lua)
}

/// Returns `{ width, height, mime_type, size, size_label }` for an image file.
fn image_details(lua: &Lua, path: String) -> LuaResult<LuaValue> {
    images::details(Path::new(&path))?.into_lua(lua)
}

/// Formats a byte count; `radix` is 2 (KiB, default) or 10 (KB).
fn format_bytes(_: &Lua, (value, radix): (u64, Option<u32>)) -> LuaResult<String> {
    let base = match radix {
        None => bytes::Base::default(),
        Some(radix) => bytes::Base::from_radix(radix).ok_or_else(|| {
            LuaError::RuntimeError(format!("Unsupported base {radix}, expected 2 or 10"))
        })?,
    };
    Ok(bytes::format_bytes(value, base))
}

/// Creates the Lua module exports. Called by mlua when loaded via `require("pairdiff")`.
#[mlua::lua_module]
fn pairdiff(lua: &Lua) -> LuaResult<LuaTable> {
    // The host may load the module more than once.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    let exports = lua.create_table()?;
    exports.set("line_at", lua.create_function(line_at)?)?;
    exports.set("find_line_index", lua.create_function(find_line_index)?)?;
    exports.set(
        "count_affected_lines",
        lua.create_function(count_affected_lines)?,
    )?;
    exports.set("compute_stats", lua.create_function(compute_stats)?)?;
    exports.set(
        "compute_stats_json",
        lua.create_function(compute_stats_json)?,
    )?;
    exports.set("summarize", lua.create_function(summarize)?)?;
    exports.set("pixel_diff", lua.create_function(pixel_diff)?)?;
    exports.set("diff_files", lua.create_function(diff_files)?)?;
    exports.set("image_details", lua.create_function(image_details)?)?;
    exports.set("format_bytes", lua.create_function(format_bytes)?)?;
    Ok(exports)
}
