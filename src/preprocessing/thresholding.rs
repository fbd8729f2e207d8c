//! # Image Thresholding Module
//!
//! Binarization for document images. Output rasters use 0 for ink and 255 for
//! background.
//!
//! - [`DocumentThreshold`]: a global Otsu pass combined with tiled local Otsu, so a
//!   pixel is ink only when both passes agree.
//! - [`GaussianAdaptiveThreshold`]: a pixel is background when it is brighter than
//!   its Gaussian-weighted neighbourhood mean minus a bias.

use image::{GrayImage, Luma};
use imageproc::filter::{box_filter, gaussian_blur_f32};

use super::strategy::Strategy;
use super::types::PreprocessingError;

/// Tiles whose intensity spread is below this use the global level instead of their own.
const LOW_CONTRAST_SPREAD: u8 = 32;

/// Computes the Otsu threshold of a grayscale image.
///
/// Pixels at or below the returned level belong to the dark class. Returns `None`
/// when no level splits the histogram into two classes, as for a uniform image.
pub fn otsu_level(gray: &GrayImage) -> Option<u8> {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total_pixels = (gray.width() as f64) * (gray.height() as f64);
    find_otsu_threshold(&histogram, total_pixels)
}

/// Finds the optimal threshold using Otsu's method by maximizing between-class variance.
fn find_otsu_threshold(histogram: &[u32; 256], total_pixels: f64) -> Option<u8> {
    if total_pixels <= 0.0 {
        return None;
    }

    // Pre-calculate cumulative statistics
    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];
    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;

    for (i, &count) in histogram.iter().enumerate() {
        cumulative_sum += count as f64;
        cumulative_weighted_sum += (i as f64) * (count as f64);
        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let total_weighted_sum = cumulative_weighted_sums[255];
    let mut max_variance = 0f64;
    let mut optimal_threshold = None;

    for threshold in 0..255usize {
        let background = cumulative_sums[threshold];
        let foreground = cumulative_sums[255] - background;
        if background == 0.0 || foreground == 0.0 {
            continue;
        }

        let w0 = background / total_pixels;
        let w1 = 1.0 - w0;
        let mu0 = cumulative_weighted_sums[threshold] / background;
        let mu1 = (total_weighted_sum - cumulative_weighted_sums[threshold]) / foreground;

        let variance = w0 * w1 * (mu0 - mu1).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = Some(threshold as u8);
        }
    }

    optimal_threshold
}

/// Whether `value` is ink for an Otsu `level`. Without a level nothing is ink.
#[inline]
pub fn is_ink(value: u8, level: Option<u8>) -> bool {
    level.is_some_and(|level| value <= level)
}

/// Maps every pixel brighter than `level` to background and the rest to ink.
pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Global Otsu binarization. An image without two classes becomes all background.
pub fn apply_otsu_threshold(gray: &GrayImage) -> GrayImage {
    match otsu_level(gray) {
        Some(level) => binarize(gray, level),
        None => GrayImage::from_pixel(gray.width(), gray.height(), Luma([255])),
    }
}

/// Tiled Otsu binarization: each `tile_size` square picks its own level, low-contrast
/// tiles reuse `global_level`. A tile left without any level is background.
pub fn local_otsu_threshold(
    gray: &GrayImage,
    tile_size: u32,
    global_level: Option<u8>,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    let tile = tile_size.max(1);
    let mut output = GrayImage::new(width, height);

    for tile_y in (0..height).step_by(tile as usize) {
        for tile_x in (0..width).step_by(tile as usize) {
            let x_end = (tile_x + tile).min(width);
            let y_end = (tile_y + tile).min(height);

            let mut histogram = [0u32; 256];
            let mut min_value = u8::MAX;
            let mut max_value = u8::MIN;
            for y in tile_y..y_end {
                for x in tile_x..x_end {
                    let value = gray.get_pixel(x, y)[0];
                    histogram[value as usize] += 1;
                    min_value = min_value.min(value);
                    max_value = max_value.max(value);
                }
            }

            let level = if max_value.saturating_sub(min_value) < LOW_CONTRAST_SPREAD {
                global_level
            } else {
                let area = ((x_end - tile_x) as f64) * ((y_end - tile_y) as f64);
                find_otsu_threshold(&histogram, area)
            };

            for y in tile_y..y_end {
                for x in tile_x..x_end {
                    let value = if is_ink(gray.get_pixel(x, y)[0], level) { 0 } else { 255 };
                    output.put_pixel(x, y, Luma([value]));
                }
            }
        }
    }

    output
}

/// Document binarization: ink where both the global and the tiled Otsu pass mark ink.
pub fn document_threshold(gray: &GrayImage, tile_size: u32) -> GrayImage {
    let start_time = std::time::Instant::now();
    let global_level = otsu_level(gray);
    let global = apply_otsu_threshold(gray);
    let local = local_otsu_threshold(gray, tile_size, global_level);

    let combined = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([global.get_pixel(x, y)[0].max(local.get_pixel(x, y)[0])])
    });

    tracing::debug!(
        target: "docscan_preprocessing",
        "Document threshold completed in {:.2}ms: global_level={:?}, tile={}, dimensions={}x{}",
        start_time.elapsed().as_secs_f64() * 1000.0,
        global_level,
        tile_size,
        gray.width(),
        gray.height()
    );

    combined
}

/// Gaussian sigma matching a square kernel of `block_size`.
fn gaussian_sigma(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Adaptive thresholding against the Gaussian-weighted local mean.
///
/// A pixel becomes background when its value exceeds `mean - bias`.
pub fn gaussian_adaptive_threshold(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let sigma = gaussian_sigma(block_size).max(0.5);
    let mean = gaussian_blur_f32(gray, sigma);
    compare_to_local_mean(gray, &mean, bias)
}

/// Adaptive thresholding against the unweighted box mean of a `2 * radius + 1` window.
pub fn mean_adaptive_threshold(gray: &GrayImage, radius: u32, bias: i32) -> GrayImage {
    let mean = box_filter(gray, radius, radius);
    compare_to_local_mean(gray, &mean, bias)
}

fn compare_to_local_mean(gray: &GrayImage, mean: &GrayImage, bias: i32) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as i32;
        let threshold = mean.get_pixel(x, y)[0] as i32 - bias;
        if value > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Primary threshold strategy: global Otsu combined with tiled local Otsu.
#[derive(Debug, Clone)]
pub struct DocumentThreshold {
    pub tile_size: u32,
    pub enabled: bool,
}

impl Strategy for DocumentThreshold {
    fn name(&self) -> &'static str {
        "document_threshold"
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
        if self.tile_size == 0 {
            return Err(PreprocessingError::ProcessingFailed {
                message: "local threshold tile size must be positive".to_string(),
            });
        }
        Ok(document_threshold(image, self.tile_size))
    }
}

/// Fallback threshold strategy: Gaussian adaptive threshold.
#[derive(Debug, Clone)]
pub struct GaussianAdaptiveThreshold {
    pub block_size: u32,
    pub bias: i32,
}

impl Strategy for GaussianAdaptiveThreshold {
    fn name(&self) -> &'static str {
        "gaussian_adaptive_threshold"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        Ok(gaussian_adaptive_threshold(image, self.block_size, self.bias))
    }
}
