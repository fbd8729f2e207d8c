//! # Perspective Correction Module
//!
//! Page extraction for photographed documents.
//!
//! - [`ForegroundCropDewarp`] crops the image to the bounding box of its ink.
//! - [`QuadPerspectiveDewarp`] finds the largest external contour of the bright
//!   page area, reduces it to a polygon and, when that polygon is a quadrilateral,
//!   maps it onto an upright rectangle. Any other polygon leaves the image unchanged.

use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::point::Point;

use super::geometry::{approximate_polygon, order_corners, rectified_size, shoelace_area};
use super::strategy::Strategy;
use super::thresholding::{is_ink, mean_adaptive_threshold, otsu_level};
use super::types::PreprocessingError;

/// Padding kept around the ink bounding box when cropping.
const CROP_MARGIN: u32 = 4;

/// Inclusive bounding box of ink pixels as `(min_x, min_y, max_x, max_y)`.
pub fn ink_bounding_box(gray: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let level = otsu_level(gray);
    gray.enumerate_pixels()
        .filter(|(_, _, pixel)| is_ink(pixel[0], level))
        .fold(None, |bbox, (x, y, _)| match bbox {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
}

/// Crops to the ink bounding box plus a small margin.
///
/// # Errors
///
/// Returns `PreprocessingError::ProcessingFailed` when the image has no ink.
pub fn crop_to_foreground(gray: &GrayImage) -> Result<GrayImage, PreprocessingError> {
    let (x0, y0, x1, y1) =
        ink_bounding_box(gray).ok_or_else(|| PreprocessingError::ProcessingFailed {
            message: "no foreground found".to_string(),
        })?;

    let (width, height) = gray.dimensions();
    let left = x0.saturating_sub(CROP_MARGIN);
    let top = y0.saturating_sub(CROP_MARGIN);
    let right = (x1 + CROP_MARGIN).min(width - 1);
    let bottom = (y1 + CROP_MARGIN).min(height - 1);

    Ok(imageops::crop_imm(gray, left, top, right - left + 1, bottom - top + 1).to_image())
}

/// Largest top-level outer contour by enclosed area.
fn largest_external_contour(binary: &GrayImage) -> Option<Vec<Point<f64>>> {
    let contours: Vec<Contour<u32>> = find_contours(binary);
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .iter()
                .map(|p| Point::new(p.x as f64, p.y as f64))
                .collect::<Vec<_>>()
        })
        .map(|points| (shoelace_area(&points), points))
        .fold(None, |best: Option<(f64, Vec<Point<f64>>)>, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        })
        .map(|(_, points)| points)
}

/// Finds the page quadrilateral, ordered TL, TR, BL, BR.
///
/// Returns `None` when the largest contour does not simplify to exactly four vertices.
pub fn detect_page_quad(
    gray: &GrayImage,
    threshold_radius: u32,
    threshold_bias: i32,
    epsilon: f64,
) -> Option<[Point<f64>; 4]> {
    let binary = mean_adaptive_threshold(gray, threshold_radius, threshold_bias);
    let contour = largest_external_contour(&binary)?;
    let polygon = approximate_polygon(&contour, epsilon);
    let corners: [Point<f64>; 4] = polygon.try_into().ok()?;
    Some(order_corners(corners))
}

/// Maps the ordered quadrilateral onto an upright rectangle sized by its longer
/// opposite edges.
pub fn rectify_quad(
    gray: &GrayImage,
    ordered: &[Point<f64>; 4],
) -> Result<GrayImage, PreprocessingError> {
    let (edge_width, edge_height) = rectified_size(ordered);
    if edge_width == 0 || edge_height == 0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: "page quadrilateral is degenerate".to_string(),
        });
    }
    // Contour points are pixel centres, so an edge of length n spans n + 1 pixels
    let (out_w, out_h) = (edge_width + 1, edge_height + 1);
    let right = (out_w - 1) as f32;
    let bottom = (out_h - 1) as f32;

    let src = ordered.map(|p| (p.x as f32, p.y as f32));
    let dest = [(0.0, 0.0), (right, 0.0), (0.0, bottom), (right, bottom)];

    let projection = Projection::from_control_points(src, dest).ok_or_else(|| {
        PreprocessingError::ProcessingFailed {
            message: "failed to compute projective transform".to_string(),
        }
    })?;

    let mut output = GrayImage::new(out_w, out_h);
    warp_into(gray, &projection, Interpolation::Bicubic, Luma([255u8]), &mut output);
    Ok(output)
}

/// Primary dewarp strategy: crop to the ink bounding box.
#[derive(Debug, Clone)]
pub struct ForegroundCropDewarp {
    pub enabled: bool,
}

impl Strategy for ForegroundCropDewarp {
    fn name(&self) -> &'static str {
        "foreground_crop_dewarp"
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
        if ink_bounding_box(image).is_none() {
            tracing::debug!(
                target: "docscan_preprocessing",
                "No foreground found, crop dewarp is a no-op"
            );
            return Ok(image.clone());
        }
        crop_to_foreground(image)
    }
}

/// Fallback dewarp strategy: perspective rectification of the page contour.
#[derive(Debug, Clone)]
pub struct QuadPerspectiveDewarp {
    pub threshold_radius: u32,
    pub threshold_bias: i32,
    pub epsilon: f64,
}

impl Strategy for QuadPerspectiveDewarp {
    fn name(&self) -> &'static str {
        "quad_perspective_dewarp"
    }

    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        let start_time = std::time::Instant::now();
        let Some(quad) =
            detect_page_quad(image, self.threshold_radius, self.threshold_bias, self.epsilon)
        else {
            tracing::debug!(
                target: "docscan_preprocessing",
                "No quadrilateral page outline found, dewarp is a no-op"
            );
            return Ok(image.clone());
        };

        let output = rectify_quad(image, &quad)?;
        tracing::debug!(
            target: "docscan_preprocessing",
            "Perspective dewarp completed in {:.2}ms: {}x{} -> {}x{}",
            start_time.elapsed().as_secs_f64() * 1000.0,
            image.width(),
            image.height(),
            output.width(),
            output.height()
        );
        Ok(output)
    }
}
