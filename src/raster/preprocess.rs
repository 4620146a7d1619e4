//! Raster cleanup applied before recognition

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::filter3x3;
use std::fmt;
use std::str::FromStr;

/// Preprocessing preset for rasters headed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Pass the rendered page through untouched
    None,
    /// Grayscale only. Rendered pages are already clean.
    #[default]
    Minimal,
    /// Grayscale and contrast stretch
    Default,
    /// Default plus sharpening and global (Otsu) binarization, for scanned pages
    Aggressive,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Default => "default",
            Self::Aggressive => "aggressive",
        }
    }

    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        if *self == Self::None {
            return image;
        }

        let mut gray = image.to_luma8();
        if matches!(self, Self::Default | Self::Aggressive) {
            gray = stretch_contrast(&gray);
        }
        if *self == Self::Aggressive {
            gray = sharpen(&gray);
            gray = binarize(&gray);
        }

        DynamicImage::ImageLuma8(gray)
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minimal" => Ok(Self::Minimal),
            "default" => Ok(Self::Default),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!(
                "unknown preset '{}' (expected none, minimal, default or aggressive)",
                other
            )),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear histogram stretch onto the full 0-255 range.
fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        return gray.clone();
    }

    let range = (max - min) as f32;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y).0[0];
        Luma([((value - min) as f32 / range * 255.0).round() as u8])
    })
}

fn sharpen(gray: &GrayImage) -> GrayImage {
    let kernel: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
    filter3x3(gray, &kernel)
}

fn binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
