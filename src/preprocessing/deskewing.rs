//! # Image Deskewing Module
//!
//! Text rotation detection and correction.
//!
//! Angles are measured in degrees in image coordinates (y down): a positive skew
//! means text lines descend to the right. Correction rotates by the opposite angle
//! about the image center, keeping the original dimensions and filling uncovered
//! corners with white.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::point::Point;

use super::geometry::{min_area_rect, normalize_skew_angle};
use super::strategy::Strategy;
use super::thresholding::{is_ink, otsu_level};
use super::types::PreprocessingError;

/// Angle search parameters for the projection-profile estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeskewSearch {
    /// Largest angle tried either side of zero
    pub max_angle: f32,
    /// Coarse sweep step
    pub coarse_step: f32,
    /// Refinement step around the coarse optimum
    pub fine_step: f32,
}

impl Default for DeskewSearch {
    fn default() -> Self {
        Self {
            max_angle: 10.0,
            coarse_step: 0.5,
            fine_step: 0.1,
        }
    }
}

/// Collects the coordinates of ink pixels (at or below the Otsu level).
fn ink_points(gray: &GrayImage) -> Vec<(u32, u32)> {
    let level = otsu_level(gray);
    gray.enumerate_pixels()
        .filter(|(_, _, pixel)| is_ink(pixel[0], level))
        .map(|(x, y, _)| (x, y))
        .collect()
}

/// Sum of squared row counts after projecting ink points onto lines at `angle_degrees`.
///
/// The score peaks when the projection direction matches the text lines, because
/// ink then piles up in few rows.
fn projection_score(points: &[(f64, f64)], angle_degrees: f32, offset: f64, bins: usize) -> f64 {
    let (sin_a, cos_a) = (angle_degrees as f64).to_radians().sin_cos();
    let mut histogram = vec![0u32; bins];

    for &(x, y) in points {
        let projected = -x * sin_a + y * cos_a + offset;
        let index = projected.round();
        if index >= 0.0 && (index as usize) < bins {
            histogram[index as usize] += 1;
        }
    }

    histogram.iter().map(|&count| (count as f64) * (count as f64)).sum()
}

/// Estimates text skew by maximizing projection-profile energy over a coarse sweep
/// followed by a fine sweep. Returns `None` when the image has no ink.
pub fn estimate_skew_projection(gray: &GrayImage, search: &DeskewSearch) -> Option<f32> {
    let ink = ink_points(gray);
    if ink.is_empty() {
        return None;
    }

    let (width, height) = gray.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let points: Vec<(f64, f64)> = ink
        .iter()
        .map(|&(x, y)| (x as f64 - cx, y as f64 - cy))
        .collect();
    let offset = cx.hypot(cy).ceil() + 1.0;
    let bins = (2.0 * offset) as usize + 1;

    // Zero is scored first so ties keep the image as it is
    let mut best_angle = 0.0f32;
    let mut best_score = projection_score(&points, 0.0, offset, bins);

    let coarse_steps = (search.max_angle / search.coarse_step).round() as i32;
    for i in -coarse_steps..=coarse_steps {
        let angle = i as f32 * search.coarse_step;
        let score = projection_score(&points, angle, offset, bins);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    let fine_steps = (search.coarse_step / search.fine_step).round() as i32;
    let center = best_angle;
    for i in -fine_steps..=fine_steps {
        let angle = center + i as f32 * search.fine_step;
        if angle.abs() > search.max_angle {
            continue;
        }
        let score = projection_score(&points, angle, offset, bins);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    Some(best_angle)
}

/// Estimates skew from the minimum-area rectangle around all ink pixels.
/// Returns `None` when there are fewer than two distinct ink pixels.
pub fn estimate_skew_min_area_rect(gray: &GrayImage) -> Option<f32> {
    let points: Vec<Point<f64>> = ink_points(gray)
        .into_iter()
        .map(|(x, y)| Point::new(x as f64, y as f64))
        .collect();
    let rect = min_area_rect(&points)?;
    Some(normalize_skew_angle(rect.angle) as f32)
}

/// Rotates the image to undo `skew_degrees` of skew.
pub fn rotate_to_level(gray: &GrayImage, skew_degrees: f32) -> GrayImage {
    rotate_about_center(
        gray,
        -skew_degrees.to_radians(),
        Interpolation::Bicubic,
        Luma([255u8]),
    )
}

fn correct_skew(
    gray: &GrayImage,
    angle: Option<f32>,
    min_angle: f32,
    method: &str,
) -> GrayImage {
    let start_time = std::time::Instant::now();
    let Some(angle) = angle else {
        tracing::debug!(
            target: "docscan_preprocessing",
            "No ink found, skipping {} deskew",
            method
        );
        return gray.clone();
    };

    if angle.abs() < min_angle {
        tracing::debug!(
            target: "docscan_preprocessing",
            "Skew angle {:.2}° is below threshold, skipping deskewing",
            angle
        );
        return gray.clone();
    }

    let rotated = rotate_to_level(gray, angle);
    tracing::debug!(
        target: "docscan_preprocessing",
        "Deskewing ({}) completed in {:.2}ms: corrected {:.2}° skew",
        method,
        start_time.elapsed().as_secs_f64() * 1000.0,
        angle
    );
    rotated
}

/// Primary deskew strategy: projection-profile angle search.
#[derive(Debug, Clone)]
pub struct ProjectionProfileDeskew {
    pub search: DeskewSearch,
    pub min_angle: f32,
    pub enabled: bool,
}

impl Strategy for ProjectionProfileDeskew {
    fn name(&self) -> &'static str {
        "projection_profile_deskew"
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
        if self.search.coarse_step <= 0.0 || self.search.fine_step <= 0.0 {
            return Err(PreprocessingError::ProcessingFailed {
                message: "deskew search steps must be positive".to_string(),
            });
        }
        let angle = estimate_skew_projection(image, &self.search);
        Ok(correct_skew(image, angle, self.min_angle, self.name()))
    }
}

/// Fallback deskew strategy: minimum-area rectangle over ink pixels.
#[derive(Debug, Clone)]
pub struct MinAreaRectDeskew {
    pub min_angle: f32,
}

impl Strategy for MinAreaRectDeskew {
    fn name(&self) -> &'static str {
        "min_area_rect_deskew"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        let angle = estimate_skew_min_area_rect(image);
        Ok(correct_skew(image, angle, self.min_angle, self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three parallel ink bars descending to the right at `angle_degrees`.
    fn create_skewed_lines_image(angle_degrees: f32) -> GrayImage {
        let mut img = GrayImage::from_pixel(300, 200, Luma([255]));
        let slope = angle_degrees.to_radians().tan();
        for base in [50.0f32, 95.0, 140.0] {
            for x in 20..280u32 {
                let center = base + (x as f32 - 20.0) * slope;
                for dy in 0..5 {
                    let y = (center + dy as f32).round() as u32;
                    if y < 200 {
                        img.put_pixel(x, y, Luma([0]));
                    }
                }
            }
        }
        img
    }

    #[test]
    fn test_projection_estimate_on_level_text() {
        let img = create_skewed_lines_image(0.0);
        let angle = estimate_skew_projection(&img, &DeskewSearch::default())
            .expect("ink should be found");
        assert!(angle.abs() < 0.05, "angle {}", angle);
    }

    #[test]
    fn test_projection_estimate_detects_skew() {
        let img = create_skewed_lines_image(3.0);
        let angle = estimate_skew_projection(&img, &DeskewSearch::default())
            .expect("ink should be found");
        assert!((angle - 3.0).abs() < 1.0, "angle {}", angle);
    }

    #[test]
    fn test_min_area_rect_estimate_detects_skew() {
        let img = create_skewed_lines_image(3.0);
        let angle = estimate_skew_min_area_rect(&img).expect("ink should be found");
        assert!((angle - 3.0).abs() < 1.0, "angle {}", angle);
    }

    #[test]
    fn test_blank_image_has_no_estimate() {
        let primary = ProjectionProfileDeskew {
            search: DeskewSearch::default(),
            min_angle: 0.1,
            enabled: true,
        };
        let fallback = MinAreaRectDeskew { min_angle: 0.1 };
        for value in [0u8, 40, 100, 200, 255] {
            let img = GrayImage::from_pixel(50, 50, Luma([value]));
            assert!(estimate_skew_projection(&img, &DeskewSearch::default()).is_none());
            assert!(estimate_skew_min_area_rect(&img).is_none());
            assert_eq!(primary.apply(&img).expect("no-op succeeds"), img);
            assert_eq!(fallback.apply(&img).expect("no-op succeeds"), img);
        }
    }

    #[test]
    fn test_deskew_levels_skewed_text() {
        let img = create_skewed_lines_image(3.0);
        let strategy = MinAreaRectDeskew { min_angle: 0.1 };
        let corrected = strategy.apply(&img).expect("deskew should succeed");
        assert_eq!(corrected.dimensions(), img.dimensions());

        let residual = estimate_skew_projection(&corrected, &DeskewSearch::default())
            .expect("ink should survive rotation");
        assert!(residual.abs() < 1.0, "residual {}", residual);
    }

    #[test]
    fn test_deskew_is_noop_on_level_text() {
        let img = create_skewed_lines_image(0.0);
        let strategy = ProjectionProfileDeskew {
            search: DeskewSearch::default(),
            min_angle: 0.1,
            enabled: true,
        };
        let once = strategy.apply(&img).expect("deskew should succeed");
        let twice = strategy.apply(&once).expect("deskew should succeed");
        assert_eq!(once, img);
        assert_eq!(twice.dimensions(), img.dimensions());
    }
}
