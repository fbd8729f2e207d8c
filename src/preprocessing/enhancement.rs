//! # Page Enhancement Module
//!
//! Single-strategy stages that prepare a photographed page before the hybrid stages:
//!
//! - [`ProjectionOrientation`]: quarter-turn correction chosen by comparing the
//!   variance of the row and column ink profiles
//! - [`BorderTrim`]: crop to the content box plus a proportional margin
//! - [`ContrastEnhancement`]: histogram equalization followed by a gamma curve
//! - [`BackgroundRemoval`]: mean adaptive threshold followed by an opening of the
//!   background

use image::{imageops, GrayImage, Luma};
use imageproc::contrast::equalize_histogram;

use super::dewarping::ink_bounding_box;
use super::filtering::close_ink;
use super::strategy::Strategy;
use super::thresholding::{apply_otsu_threshold, mean_adaptive_threshold};
use super::types::PreprocessingError;

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Whether the page reads sideways: its binarized column profile varies more than
/// its row profile.
pub fn needs_quarter_turn(gray: &GrayImage) -> bool {
    let binary = apply_otsu_threshold(gray);
    let (width, height) = binary.dimensions();

    let mut row_sums = vec![0f64; height as usize];
    let mut column_sums = vec![0f64; width as usize];
    for (x, y, pixel) in binary.enumerate_pixels() {
        let value = pixel[0] as f64;
        row_sums[y as usize] += value;
        column_sums[x as usize] += value;
    }

    variance(&column_sums) > variance(&row_sums)
}

/// Rotates the page a quarter turn clockwise when it reads sideways.
pub fn auto_orient(gray: &GrayImage) -> GrayImage {
    if needs_quarter_turn(gray) {
        imageops::rotate90(gray)
    } else {
        gray.clone()
    }
}

/// Crops to the ink bounding box grown by `margin_ratio` of its own size on each side.
/// A page without ink is returned unchanged.
pub fn remove_borders(gray: &GrayImage, margin_ratio: f32) -> GrayImage {
    let Some((x0, y0, x1, y1)) = ink_bounding_box(gray) else {
        return gray.clone();
    };
    let (width, height) = gray.dimensions();
    let box_width = x1 - x0 + 1;
    let box_height = y1 - y0 + 1;
    let margin_x = (box_width as f32 * margin_ratio) as u32;
    let margin_y = (box_height as f32 * margin_ratio) as u32;

    let left = x0.saturating_sub(margin_x);
    let top = y0.saturating_sub(margin_y);
    let crop_width = (box_width + 2 * margin_x).min(width - left);
    let crop_height = (box_height + 2 * margin_y).min(height - top);

    imageops::crop_imm(gray, left, top, crop_width, crop_height).to_image()
}

/// Applies `255 * (v / 255)^(1 / gamma)` through a lookup table.
pub fn apply_gamma(gray: &GrayImage, gamma: f32) -> GrayImage {
    let exponent = 1.0 / gamma as f64;
    let table: Vec<u8> = (0..=255u32)
        .map(|v| (255.0 * (v as f64 / 255.0).powf(exponent)).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([table[gray.get_pixel(x, y)[0] as usize]])
    })
}

/// Binarizes against the local box mean, then opens the background so paper-coloured
/// specks inside ink strokes are filled.
pub fn remove_background(gray: &GrayImage, radius: u32, bias: i32) -> GrayImage {
    let binary = mean_adaptive_threshold(gray, radius, bias);
    close_ink(&binary, 1)
}

/// Quarter-turn orientation from projection-profile variance.
#[derive(Debug, Clone, Default)]
pub struct ProjectionOrientation;

impl Strategy for ProjectionOrientation {
    fn name(&self) -> &'static str {
        "projection_orientation"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        let rotated = needs_quarter_turn(image);
        tracing::debug!(
            target: "docscan_preprocessing",
            "Auto-orientation: rotated={}, dimensions={}x{}",
            rotated,
            image.width(),
            image.height()
        );
        Ok(if rotated {
            imageops::rotate90(image)
        } else {
            image.clone()
        })
    }
}

/// Content crop with a proportional margin.
#[derive(Debug, Clone)]
pub struct BorderTrim {
    pub margin_ratio: f32,
}

impl Strategy for BorderTrim {
    fn name(&self) -> &'static str {
        "foreground_border_trim"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        if !(0.0..=1.0).contains(&self.margin_ratio) {
            return Err(PreprocessingError::ProcessingFailed {
                message: format!("border margin ratio {} is out of range", self.margin_ratio),
            });
        }
        Ok(remove_borders(image, self.margin_ratio))
    }
}

/// Histogram equalization followed by gamma correction.
#[derive(Debug, Clone)]
pub struct ContrastEnhancement {
    pub gamma: f32,
}

impl Strategy for ContrastEnhancement {
    fn name(&self) -> &'static str {
        "histogram_contrast"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        if self.gamma.is_nan() || self.gamma <= 0.0 {
            return Err(PreprocessingError::ProcessingFailed {
                message: "contrast gamma must be positive".to_string(),
            });
        }
        let equalized = equalize_histogram(image);
        if (self.gamma - 1.0).abs() < f32::EPSILON {
            return Ok(equalized);
        }
        Ok(apply_gamma(&equalized, self.gamma))
    }
}

/// Mean adaptive threshold with a background opening.
#[derive(Debug, Clone)]
pub struct BackgroundRemoval {
    pub radius: u32,
    pub bias: i32,
}

impl Strategy for BackgroundRemoval {
    fn name(&self) -> &'static str {
        "adaptive_background_removal"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        Ok(remove_background(image, self.radius, self.bias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Page with three horizontal ink bars, like lines of text.
    fn create_upright_page() -> GrayImage {
        let mut img = GrayImage::from_pixel(200, 120, Luma([245]));
        for top in [20u32, 50, 80] {
            for y in top..top + 10 {
                for x in 20..180 {
                    img.put_pixel(x, y, Luma([15]));
                }
            }
        }
        img
    }

    #[test]
    fn test_upright_page_is_not_rotated() {
        let page = create_upright_page();
        assert!(!needs_quarter_turn(&page));
        assert_eq!(auto_orient(&page), page);
    }

    #[test]
    fn test_sideways_page_is_turned_upright() {
        let sideways = imageops::rotate270(&create_upright_page());
        assert!(needs_quarter_turn(&sideways));

        let oriented = auto_orient(&sideways);
        assert_eq!(oriented.dimensions(), (200, 120));
        assert_eq!(oriented, create_upright_page());
    }

    #[test]
    fn test_flat_page_is_not_rotated() {
        for value in [30u8, 200] {
            let page = GrayImage::from_pixel(40, 20, Luma([value]));
            assert!(!needs_quarter_turn(&page));
        }
    }

    #[test]
    fn test_remove_borders_keeps_proportional_margin() {
        let mut page = GrayImage::from_pixel(200, 100, Luma([250]));
        for y in 40..60 {
            for x in 50..150 {
                page.put_pixel(x, y, Luma([10]));
            }
        }
        let trimmed = remove_borders(&page, 0.1);
        assert_eq!(trimmed.dimensions(), (120, 24));
        assert_eq!(trimmed.get_pixel(10, 2)[0], 10);
        assert_eq!(trimmed.get_pixel(0, 0)[0], 250);
    }

    #[test]
    fn test_remove_borders_clamps_to_image_and_skips_blank_page() {
        let mut page = GrayImage::from_pixel(50, 40, Luma([250]));
        for y in 0..40 {
            for x in 0..25 {
                page.put_pixel(x, y, Luma([10]));
            }
        }
        assert_eq!(remove_borders(&page, 0.1).dimensions(), (29, 40));

        let blank = GrayImage::from_pixel(50, 40, Luma([90]));
        assert_eq!(remove_borders(&blank, 0.1), blank);
    }

    #[test]
    fn test_contrast_enhancement_stretches_narrow_histogram() {
        let page = GrayImage::from_fn(32, 32, |x, _| Luma([100 + (x % 10) as u8]));
        let strategy = ContrastEnhancement { gamma: 1.0 };
        let enhanced = strategy.apply(&page).expect("enhancement succeeds");

        let min = enhanced.pixels().map(|p| p[0]).min().unwrap_or(0);
        let max = enhanced.pixels().map(|p| p[0]).max().unwrap_or(0);
        assert!(max - min > 200, "range {}..{}", min, max);
    }

    #[test]
    fn test_gamma_curve() {
        let ramp = GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]));
        assert_eq!(apply_gamma(&ramp, 1.0), ramp);

        let lighter = apply_gamma(&ramp, 2.0);
        assert_eq!(lighter.get_pixel(0, 0)[0], 0);
        assert_eq!(lighter.get_pixel(255, 0)[0], 255);
        assert!(lighter.get_pixel(64, 0)[0] > 64);

        assert!(ContrastEnhancement { gamma: 0.0 }.apply(&ramp).is_err());
    }

    #[test]
    fn test_background_removal_binarizes_uneven_page() {
        // Lighting falls off to the right; text stays darker than its surroundings
        let mut page = GrayImage::from_fn(120, 60, |x, _| Luma([240 - (x / 2) as u8]));
        for y in 25..35 {
            for x in 10..110 {
                page.put_pixel(x, y, Luma([20]));
            }
        }
        page.put_pixel(60, 30, Luma([240]));

        let cleaned = remove_background(&page, 15, 15);
        assert!(cleaned.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(cleaned.get_pixel(30, 30)[0], 0);
        assert_eq!(cleaned.get_pixel(5, 5)[0], 255);
        assert_eq!(cleaned.get_pixel(60, 5)[0], 255);
        assert_eq!(cleaned.get_pixel(115, 50)[0], 255);
        // A bright speck inside the stroke is filled
        assert_eq!(cleaned.get_pixel(60, 30)[0], 0);
    }
}
