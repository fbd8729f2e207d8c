//! # Image Scaling Module
//!
//! Fixed-factor upscaling applied before the strategy stages. Small glyphs
//! recognize better once enlarged, and Catmull-Rom keeps stroke edges smooth.

use image::imageops::{self, FilterType};
use image::GrayImage;

use super::types::PreprocessingError;

/// Resizes grayscale rasters by a constant factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageScaler {
    scale_factor: f32,
}

impl ImageScaler {
    /// Default upscale factor.
    pub const DEFAULT_SCALE_FACTOR: f32 = 1.5;

    /// Largest accepted factor.
    const MAX_SCALE_FACTOR: f32 = 8.0;

    /// Creates a scaler with the default factor of 1.5.
    ///
    /// # Examples
    ///
    /// ```
    /// use docscan::preprocessing::ImageScaler;
    ///
    /// let scaler = ImageScaler::new();
    /// assert_eq!(scaler.scale_factor(), 1.5);
    /// ```
    pub fn new() -> Self {
        Self {
            scale_factor: Self::DEFAULT_SCALE_FACTOR,
        }
    }

    /// Creates a scaler with a custom factor.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessingError::InvalidInput` unless `0 < factor <= 8`.
    pub fn with_scale_factor(factor: f32) -> Result<Self, PreprocessingError> {
        if !(factor > 0.0 && factor <= Self::MAX_SCALE_FACTOR) {
            return Err(PreprocessingError::InvalidInput {
                message: format!("scale factor {} must be in (0, 8]", factor),
            });
        }
        Ok(Self {
            scale_factor: factor,
        })
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Output dimensions for an input of `width` x `height`, never below 1x1.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let scaled = |v: u32| ((v as f32 * self.scale_factor).round() as u32).max(1);
        (scaled(width), scaled(height))
    }

    /// Resizes with Catmull-Rom interpolation. Empty images are returned as they are.
    pub fn scale(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }
        let (new_width, new_height) = self.target_dimensions(width, height);
        if (new_width, new_height) == (width, height) {
            return image.clone();
        }
        imageops::resize(image, new_width, new_height, FilterType::CatmullRom)
    }
}

impl Default for ImageScaler {
    fn default() -> Self {
        Self::new()
    }
}
