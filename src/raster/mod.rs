//! Page rasterization
//!
//! Renders one page of a [`DocumentHandle`] into pixels with MuPDF. Each call
//! opens its own MuPDF document from the handle's bytes, so a failing page
//! never affects the handle or other pages.

pub mod preprocess;

use crate::document::DocumentHandle;
use crate::error::RasterError;
use image::{DynamicImage, ImageFormat, RgbImage};
use mupdf::{Colorspace, Matrix, Pixmap};
use std::io::Cursor;
use std::time::Instant;
use tracing::instrument;

pub use preprocess::Preset;

/// Largest raster side, in pixels, that will be allocated.
pub const MAX_RASTER_SIDE: u64 = 16384;

/// Largest raster area, in pixels (about 192 MB of RGB).
pub const MAX_RASTER_PIXELS: u64 = 64_000_000;

/// A rendered page.
#[derive(Debug, Clone)]
pub struct PageRaster {
    image: DynamicImage,
    page: u32,
    scale: f32,
}

impl PageRaster {
    pub fn new(image: DynamicImage, page: u32, scale: f32) -> Self {
        Self { image, page, scale }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Source page number (1-indexed)
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Apply an OCR preprocessing preset.
    pub fn preprocess(self, preset: Preset) -> Self {
        Self {
            image: preset.apply(self.image),
            ..self
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>, RasterError> {
        let mut png = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RasterError::RenderFailed {
                page: self.page,
                reason: format!("PNG encoding failed: {}", e),
            })?;
        Ok(png)
    }
}

/// Render `page` (1-indexed) at `scale` pixels per point.
#[instrument(skip(doc), fields(pages = doc.page_count()))]
pub fn rasterize(doc: &DocumentHandle, page: u32, scale: f32) -> Result<PageRaster, RasterError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RasterError::InvalidScale(scale));
    }
    let total = doc.page_count();
    if page < 1 || page > total {
        return Err(RasterError::PageOutOfRange { page, total });
    }

    let start = Instant::now();
    let render_failed = |reason: String| RasterError::RenderFailed { page, reason };

    let mupdf_doc = mupdf::Document::from_bytes(doc.bytes().as_bytes(), "application/pdf")
        .map_err(|e| render_failed(format!("Failed to open document: {}", e)))?;
    let mupdf_page = mupdf_doc
        .load_page(page as i32 - 1)
        .map_err(|e| render_failed(format!("Failed to load page: {}", e)))?;

    // Bounds already account for /Rotate
    let bounds = mupdf_page
        .bounds()
        .map_err(|e| render_failed(format!("Failed to read page bounds: {}", e)))?;
    let width = ((bounds.x1 - bounds.x0) * scale).ceil().max(0.0) as u64;
    let height = ((bounds.y1 - bounds.y0) * scale).ceil().max(0.0) as u64;
    check_size(width, height)?;

    let pixmap = mupdf_page
        .to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            false,
            false,
        )
        .map_err(|e| render_failed(format!("Failed to render: {}", e)))?;
    let image = pixmap_to_rgb(&pixmap).map_err(render_failed)?;

    tracing::debug!(
        "Rendered page {} at {}x{} in {}ms",
        page,
        image.width(),
        image.height(),
        start.elapsed().as_millis()
    );

    Ok(PageRaster::new(DynamicImage::ImageRgb8(image), page, scale))
}

fn check_size(width: u64, height: u64) -> Result<(), RasterError> {
    if width > MAX_RASTER_SIDE
        || height > MAX_RASTER_SIDE
        || width.saturating_mul(height) > MAX_RASTER_PIXELS
    {
        return Err(RasterError::TooLarge { width, height });
    }
    Ok(())
}

/// Copy the colour channels of an RGB pixmap, dropping row padding.
fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<RgbImage, String> {
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let n = pixmap.n() as usize;
    let samples = pixmap.samples();
    if n < 3 {
        return Err(format!("Unexpected pixmap with {} components", n));
    }
    if width == 0 || height == 0 {
        return Err("Page rendered to an empty pixmap".to_string());
    }

    let stride = samples.len() / height;
    if stride < width * n {
        return Err(format!(
            "Pixmap too short: {} bytes for {}x{}",
            samples.len(),
            width,
            height
        ));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in samples.chunks_exact(stride).take(height) {
        for pixel in row[..width * n].chunks_exact(n) {
            rgb.extend_from_slice(&pixel[..3]);
        }
    }
    RgbImage::from_raw(width as u32, height as u32, rgb)
        .ok_or_else(|| "Invalid pixmap dimensions".to_string())
}
