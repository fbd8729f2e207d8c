//! # Image Filtering Module
//!
//! Noise reduction for document rasters, where ink is dark and paper is bright.
//!
//! - [`MorphologicalDenoise`]: an opening that removes isolated ink specks followed by
//!   a closing that re-joins broken strokes. Both operate on grayscale values through
//!   square min/max filters, so they also work before binarization.
//! - [`SmoothingDenoise`]: median blur followed by an edge-preserving bilateral filter.

use image::{GrayImage, Luma};
use imageproc::filter::{bilateral_filter, median_filter};

use super::strategy::Strategy;
use super::types::PreprocessingError;

/// Minimum over a `(2r+1)` square window. Grows dark ink.
pub fn min_filter(image: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(image, radius, u8::min, u8::MAX)
}

/// Maximum over a `(2r+1)` square window. Shrinks dark ink.
pub fn max_filter(image: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(image, radius, u8::max, u8::MIN)
}

/// Separable square extremum filter; windows are clamped at the image border.
fn rank_filter(image: &GrayImage, radius: u32, pick: fn(u8, u8) -> u8, identity: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return image.clone();
    }

    let mut horizontal = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(width - 1);
            let value = (x0..=x1).fold(identity, |acc, nx| pick(acc, image.get_pixel(nx, y)[0]));
            horizontal.put_pixel(x, y, Luma([value]));
        }
    }

    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(height - 1);
        for x in 0..width {
            let value = (y0..=y1).fold(identity, |acc, ny| pick(acc, horizontal.get_pixel(x, ny)[0]));
            output.put_pixel(x, y, Luma([value]));
        }
    }

    output
}

/// Removes ink specks smaller than the structuring element.
pub fn open_ink(image: &GrayImage, radius: u32) -> GrayImage {
    min_filter(&max_filter(image, radius), radius)
}

/// Fills background gaps narrower than the structuring element inside ink strokes.
pub fn close_ink(image: &GrayImage, radius: u32) -> GrayImage {
    max_filter(&min_filter(image, radius), radius)
}

/// Primary denoise strategy: opening then closing.
#[derive(Debug, Clone)]
pub struct MorphologicalDenoise {
    pub open_radius: u32,
    pub close_radius: u32,
    pub enabled: bool,
}

impl Strategy for MorphologicalDenoise {
    fn name(&self) -> &'static str {
        "morphological_denoise"
    }

    fn probe(&self) -> Result<(), PreprocessingError> {
        if self.enabled {
            Ok(())
        } else {
            Err(PreprocessingError::CapabilityUnavailable {
                capability: self.name().to_string(),
            })
        }
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        let start_time = std::time::Instant::now();
        let opened = open_ink(image, self.open_radius);
        let closed = close_ink(&opened, self.close_radius);

        tracing::debug!(
            target: "docscan_preprocessing",
            "Morphological denoise completed in {:.2}ms: open_radius={}, close_radius={}",
            start_time.elapsed().as_secs_f64() * 1000.0,
            self.open_radius,
            self.close_radius
        );
        Ok(closed)
    }
}

/// Fallback denoise strategy: median blur then bilateral filter.
#[derive(Debug, Clone)]
pub struct SmoothingDenoise {
    pub median_radius: u32,
    pub bilateral_window: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Strategy for SmoothingDenoise {
    fn name(&self) -> &'static str {
        "median_bilateral_denoise"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        if self.sigma_color <= 0.0 || self.sigma_space <= 0.0 {
            return Err(PreprocessingError::ProcessingFailed {
                message: "bilateral sigmas must be positive".to_string(),
            });
        }
        if image.width() == 0 || image.height() == 0 {
            return Ok(image.clone());
        }
        let median = median_filter(image, self.median_radius, self.median_radius);
        Ok(bilateral_filter(
            &median,
            self.bilateral_window,
            self.sigma_color,
            self.sigma_space,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_page_with_speck_and_stroke() -> GrayImage {
        let mut img = GrayImage::from_pixel(30, 30, Luma([255]));
        // Single-pixel speck
        img.put_pixel(5, 5, Luma([0]));
        // Thick stroke with a one-pixel gap at x = 15
        for y in 18..24 {
            for x in 8..22 {
                if x != 15 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    #[test]
    fn test_min_max_filters_clamp_borders() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([200]));
        img.put_pixel(0, 0, Luma([10]));
        let eroded = min_filter(&img, 1);
        assert_eq!(eroded.get_pixel(0, 0)[0], 10);
        assert_eq!(eroded.get_pixel(1, 1)[0], 10);
        assert_eq!(eroded.get_pixel(4, 4)[0], 200);

        // Borders keep real values instead of zero
        let dilated = max_filter(&img, 1);
        assert_eq!(dilated.get_pixel(4, 0)[0], 200);
        assert_eq!(dilated.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn test_open_removes_speck_and_close_fills_gap() {
        let img = create_page_with_speck_and_stroke();

        let opened = open_ink(&img, 1);
        assert_eq!(opened.get_pixel(5, 5)[0], 255);
        assert_eq!(opened.get_pixel(10, 20)[0], 0);

        let closed = close_ink(&opened, 1);
        assert_eq!(closed.get_pixel(15, 20)[0], 0);
    }

    #[test]
    fn test_morphological_denoise_strategy() {
        let strategy = MorphologicalDenoise {
            open_radius: 1,
            close_radius: 1,
            enabled: true,
        };
        let output = strategy
            .apply(&create_page_with_speck_and_stroke())
            .expect("denoise should succeed");
        assert_eq!(output.dimensions(), (30, 30));
        assert_eq!(output.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn test_bilateral_filter_preserves_flat_regions_and_edges() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([0]) } else { Luma([255]) });
        let filtered = bilateral_filter(&img, 9, 75.0, 75.0);
        assert_eq!(filtered.get_pixel(2, 10)[0], 0);
        assert_eq!(filtered.get_pixel(17, 10)[0], 255);
        // A 255 step is far outside sigma_color, so the edge stays sharp
        assert!(filtered.get_pixel(9, 10)[0] < 10);
        assert!(filtered.get_pixel(10, 10)[0] > 245);
    }

    #[test]
    fn test_smoothing_denoise_keeps_flat_dark_page() {
        let img = GrayImage::from_pixel(12, 12, Luma([0]));
        let strategy = SmoothingDenoise {
            median_radius: 1,
            bilateral_window: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        };
        assert_eq!(strategy.apply(&img).expect("smoothing should succeed"), img);
    }

    #[test]
    fn test_smoothing_denoise_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(16, 16, Luma([200]));
        img.put_pixel(8, 8, Luma([0]));
        let strategy = SmoothingDenoise {
            median_radius: 1,
            bilateral_window: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        };
        let output = strategy.apply(&img).expect("smoothing should succeed");
        assert_eq!(output.get_pixel(8, 8)[0], 200);
    }
}
