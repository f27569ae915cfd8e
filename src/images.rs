//! Getting image files into comparable pixel buffers.
//!
//! The pixel diff needs two buffers of the same size. A viewer gets there by
//! letterboxing the base image into its canvas and drawing both images at
//! that size. [`fit_within`] computes the draw size, [`prepare`] resamples a
//! decoded image to it, and [`diff_files`] runs the whole pipeline from two
//! paths.

use crate::bytes::{Base, format_bytes};
use crate::error::Result;
use crate::memo::IdentityMemo;
use crate::perceptual::PerceptualOptions;
use crate::pixels::{self, Algorithm, ImageBuffer, PixelDiff};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, RgbaImage};
use mlua::prelude::*;
use std::path::Path;
use std::sync::Arc;

impl From<RgbaImage> for ImageBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        ImageBuffer::from_parts(width, height, image.into_raw())
    }
}

/// Decodes an image file in any format the `image` crate recognises.
pub fn load(path: &Path) -> Result<DynamicImage> {
    log::debug!("Decoding image {}", path.display());
    Ok(image::open(path)?)
}

/// Decodes images, reusing the result for repeated requests with the same
/// `Arc<Path>`.
#[derive(Default)]
pub struct ImageLoader {
    cache: IdentityMemo<Path, Arc<DynamicImage>>,
}

impl ImageLoader {
    pub fn load(&mut self, path: &Arc<Path>) -> Result<Arc<DynamicImage>> {
        self.cache
            .get_or_try_insert_with(path, |p| load(p).map(Arc::new))
    }
}

/// Largest size with the image's aspect ratio that fits the canvas.
///
/// The image is first scaled to the canvas width; if that makes it too
/// tall, it is scaled to the canvas height instead. Fractional sizes are
/// truncated, and each side is at least one pixel unless the image or
/// canvas is empty.
#[must_use]
pub fn fit_within(
    image_width: u32,
    image_height: u32,
    canvas_width: u32,
    canvas_height: u32,
) -> (u32, u32) {
    if image_width == 0 || image_height == 0 || canvas_width == 0 || canvas_height == 0 {
        return (0, 0);
    }

    let aspect = f64::from(image_width) / f64::from(image_height);
    let mut width = f64::from(canvas_width);
    let mut height = width / aspect;

    if height > f64::from(canvas_height) {
        height = f64::from(canvas_height);
        width = height * aspect;
    }

    (width.floor().max(1.0) as u32, height.floor().max(1.0) as u32)
}

/// Resamples `image` to exactly `width` x `height` RGBA pixels.
#[must_use]
pub fn prepare(image: &DynamicImage, width: u32, height: u32) -> ImageBuffer {
    if image.width() == width && image.height() == height {
        return image.to_rgba8().into();
    }
    image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgba8()
        .into()
}

/// Writes `buffer` as a PNG file.
pub fn save_png(buffer: &ImageBuffer, path: &Path) -> Result<()> {
    image::save_buffer_with_format(
        path,
        buffer.data(),
        buffer.width(),
        buffer.height(),
        ColorType::Rgba8,
        ImageFormat::Png,
    )?;
    Ok(())
}

/// Loads two images, draws both at the base image's letterboxed size for
/// the given canvas, and diffs them.
///
/// Without a canvas the base image's own size is used.
pub fn diff_files(
    loader: &mut ImageLoader,
    base: &Arc<Path>,
    overlay: &Arc<Path>,
    algorithm: Algorithm,
    options: &PerceptualOptions,
    canvas: Option<(u32, u32)>,
) -> Result<PixelDiff> {
    let base_image = loader.load(base)?;
    let overlay_image = loader.load(overlay)?;

    let (canvas_width, canvas_height) =
        canvas.unwrap_or((base_image.width(), base_image.height()));
    let (width, height) = fit_within(
        base_image.width(),
        base_image.height(),
        canvas_width,
        canvas_height,
    );

    pixels::diff_with(
        &prepare(&base_image, width, height),
        &prepare(&overlay_image, width, height),
        algorithm,
        options,
    )
}

/// File-level facts shown next to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetails {
    pub width: u32,
    pub height: u32,

    /// MIME type guessed from the file extension.
    pub mime_type: Option<&'static str>,

    /// File size in bytes.
    pub size: u64,

    /// File size formatted with base-2 units.
    pub size_label: String,
}

/// Reads dimensions and size without decoding the pixel data.
pub fn details(path: &Path) -> Result<ImageDetails> {
    let size = std::fs::metadata(path)?.len();
    let (width, height) = image::image_dimensions(path)?;

    Ok(ImageDetails {
        width,
        height,
        mime_type: ImageFormat::from_path(path)
            .ok()
            .map(|format| format.to_mime_type()),
        size,
        size_label: format_bytes(size, Base::Two),
    })
}

impl IntoLua for ImageDetails {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("width", self.width)?;
        table.set("height", self.height)?;
        table.set("mime_type", self.mime_type)?;
        table.set("size", self.size)?;
        table.set("size_label", self.size_label)?;
        Ok(LuaValue::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, px: [u8; 4]) -> Arc<Path> {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba(px))
            .save(&path)
            .unwrap();
        Arc::from(path.as_path())
    }

    #[test]
    fn fit_wide_image_to_canvas_width() {
        assert_eq!(fit_within(200, 100, 100, 100), (100, 50));
    }

    #[test]
    fn fit_tall_image_to_canvas_height() {
        assert_eq!(fit_within(100, 200, 100, 100), (50, 100));
    }

    #[test]
    fn fit_scales_up_small_images() {
        assert_eq!(fit_within(10, 10, 300, 200), (200, 200));
    }

    #[test]
    fn fit_truncates_and_keeps_one_pixel() {
        assert_eq!(fit_within(3, 1, 10, 10), (10, 3));
        assert_eq!(fit_within(1000, 1, 10, 10), (10, 1));
        assert_eq!(fit_within(0, 10, 10, 10), (0, 0));
    }

    #[test]
    fn prepare_resamples_to_target() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([9, 9, 9, 255])));
        let buffer = prepare(&image, 2, 1);
        assert_eq!((buffer.width(), buffer.height()), (2, 1));
        assert_eq!(buffer.data().len(), 8);
        assert_eq!(buffer.pixel(0, 0), Some([9, 9, 9, 255]));
    }

    #[test]
    fn prepare_keeps_matching_size() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4])));
        let buffer = prepare(&image, 3, 3);
        assert_eq!(buffer.pixel(2, 2), Some([1, 2, 3, 4]));
    }

    #[test]
    fn save_and_reload_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.png");
        let buffer = ImageBuffer::new(1, 1, vec![5, 10, 0, 255]).unwrap();

        save_png(&buffer, &path).unwrap();
        let reloaded = prepare(&load(&path).unwrap(), 1, 1);
        assert_eq!(reloaded, buffer);
    }

    #[test]
    fn loader_reuses_decoded_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 2, 2, [0, 0, 0, 255]);
        let mut loader = ImageLoader::default();

        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn loader_reports_missing_file() {
        let mut loader = ImageLoader::default();
        let path: Arc<Path> = Arc::from(Path::new("/definitely/not/here.png"));
        assert!(loader.load(&path).is_err());
    }

    #[test]
    fn diff_files_scales_overlay_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_png(dir.path(), "base.png", 4, 2, [10, 20, 30, 255]);
        let overlay = write_png(dir.path(), "overlay.png", 8, 4, [15, 10, 30, 255]);
        let mut loader = ImageLoader::default();

        let result = diff_files(
            &mut loader,
            &base,
            &overlay,
            Algorithm::RawChannel,
            &PerceptualOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!((result.image.width(), result.image.height()), (4, 2));
        assert_eq!(result.mismatched, 8);
        assert_eq!(result.image.pixel(3, 1), Some([5, 10, 0, 255]));
    }

    #[test]
    fn diff_files_letterboxes_into_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_png(dir.path(), "base.png", 4, 2, [0, 0, 0, 255]);
        let mut loader = ImageLoader::default();

        let result = diff_files(
            &mut loader,
            &base,
            &base,
            Algorithm::Perceptual,
            &PerceptualOptions::default(),
            Some((2, 2)),
        )
        .unwrap();

        assert_eq!((result.image.width(), result.image.height()), (2, 1));
        assert_eq!(result.mismatched, 0);
    }

    #[test]
    fn details_reads_size_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "img.png", 3, 5, [1, 1, 1, 255]);

        let info = details(&path).unwrap();
        assert_eq!((info.width, info.height), (3, 5));
        assert_eq!(info.mime_type, Some("image/png"));
        assert_eq!(info.size, std::fs::metadata(&*path).unwrap().len());
        assert!(info.size_label.ends_with(" B"));
    }
}
