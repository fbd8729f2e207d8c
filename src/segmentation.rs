//! # Region Segmentation Module
//!
//! Partitions a normalized single-channel raster into line and word regions.
//!
//! - Lines come from a horizontal projection profile of the Otsu-binarized image.
//!   A row belongs to a line while its ink count exceeds `width / line_density_divisor`;
//!   bands shorter than `min_line_rows` are dropped as noise.
//! - Words are the bounding boxes of top-level outer contours, kept when both sides
//!   exceed `min_word_size`.
//! - Scored lines carry the ink density of their re-binarized crop as confidence.
//!
//! Batch segmentation runs images in parallel with rayon and returns one result per
//! input, in input order.

use std::fmt;
use std::time::Instant;

use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use lazy_static::lazy_static;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SegmentationConfig;
use crate::diagnostics;
use crate::errors::error_logging;
use crate::observability;
use crate::preprocessing::thresholding::{is_ink, otsu_level};
use crate::raster::Image;

lazy_static! {
    static ref DEFAULT_SEGMENTER: Segmenter = Segmenter::default();
}

/// Per-image usage errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationError {
    /// Zero-sized image or inconsistent pixel buffer
    EmptyImage,
    /// Segmentation works on single-channel rasters only
    UnsupportedChannels { channels: u8 },
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationError::EmptyImage => write!(f, "Cannot segment an empty image"),
            SegmentationError::UnsupportedChannels { channels } => write!(
                f,
                "Segmentation requires a single-channel image, got {} channels",
                channels
            ),
        }
    }
}

impl std::error::Error for SegmentationError {}

/// Axis-aligned rectangle in pixel coordinates of the image it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when the region is non-empty and lies entirely inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.right() <= width
            && self.bottom() <= height
    }
}

/// A line region with its ink-density score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredRegion {
    pub region: Region,
    pub confidence: f32,
}

/// Inverted Otsu binarization: ink becomes 255, background 0. A page without two
/// intensity classes has no ink.
fn ink_mask(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if is_ink(gray.get_pixel(x, y)[0], level) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Fraction of ink pixels in `crop` after binarizing it on its own Otsu level.
///
/// A uniform crop has no level of its own and is classified by `page_level`.
fn ink_density(crop: &GrayImage, page_level: Option<u8>) -> f32 {
    let area = crop.width() as u64 * crop.height() as u64;
    if area == 0 {
        return 0.0;
    }
    let level = otsu_level(crop).or(page_level);
    let ink = crop.pixels().filter(|p| is_ink(p[0], level)).count() as u64;
    (ink as f64 / area as f64).clamp(0.0, 1.0) as f32
}

/// Segments images into lines and words.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentationConfig,
}

impl Segmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    fn validate_input(image: &Image) -> Result<GrayImage, SegmentationError> {
        if image.is_empty() {
            return Err(SegmentationError::EmptyImage);
        }
        if image.channels() != 1 {
            return Err(SegmentationError::UnsupportedChannels {
                channels: image.channels(),
            });
        }
        image
            .to_gray_image()
            .map_err(|_| SegmentationError::EmptyImage)
    }

    /// Detects text line bands, top to bottom.
    ///
    /// # Errors
    ///
    /// Returns `SegmentationError` for empty or multi-channel input.
    pub fn detect_lines(&self, image: &Image) -> Result<Vec<Region>, SegmentationError> {
        let gray = Self::validate_input(image)?;
        Ok(self.line_regions(&gray))
    }

    fn line_regions(&self, gray: &GrayImage) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        let mask = ink_mask(gray);
        let density_threshold = width / self.config.line_density_divisor.max(1);

        let row_counts: Vec<u32> = (0..height)
            .map(|y| (0..width).filter(|&x| mask.get_pixel(x, y)[0] > 0).count() as u32)
            .collect();

        let mut bands = Vec::new();
        let mut band_start: Option<u32> = None;
        for (y, &count) in row_counts.iter().enumerate() {
            let y = y as u32;
            match (band_start, count > density_threshold) {
                (None, true) => band_start = Some(y),
                (Some(start), false) => {
                    bands.push((start, y));
                    band_start = None;
                }
                _ => {}
            }
        }
        // A band still open at the last row ends at the image edge
        if let Some(start) = band_start {
            bands.push((start, height));
        }

        bands
            .into_iter()
            .filter(|(start, end)| end - start >= self.config.min_line_rows)
            .filter_map(|(start, end)| {
                let (left, right) = (start..end)
                    .filter_map(|y| {
                        let mut ink_columns = (0..width).filter(|&x| mask.get_pixel(x, y)[0] > 0);
                        let first = ink_columns.next()?;
                        let last = ink_columns.last().unwrap_or(first);
                        Some((first, last))
                    })
                    .fold(None, |extent: Option<(u32, u32)>, (first, last)| match extent {
                        None => Some((first, last)),
                        Some((l, r)) => Some((l.min(first), r.max(last))),
                    })?;
                let region_width = right - left + 1;
                (region_width > 0).then(|| Region::new(left, start, region_width, end - start))
            })
            .collect()
    }

    /// Detects lines and scores each by the ink density of its re-binarized crop.
    ///
    /// # Errors
    ///
    /// Returns `SegmentationError` for empty or multi-channel input; no regions are
    /// returned in that case.
    pub fn segment_lines(&self, image: &Image) -> Result<Vec<ScoredRegion>, SegmentationError> {
        let _span = observability::segmentation_span("segment_lines", 1).entered();
        let start_time = Instant::now();

        diagnostics::clear_error();
        let gray = Self::validate_input(image).inspect_err(|e| {
            error_logging::log_segmentation_error(
                e,
                "segment_lines",
                None,
                Some(image.dimensions()),
            );
            diagnostics::record_error(e.to_string());
        })?;

        let page_level = otsu_level(&gray);
        let scored: Vec<ScoredRegion> = self
            .line_regions(&gray)
            .into_iter()
            .map(|region| {
                let crop =
                    imageops::crop_imm(&gray, region.x, region.y, region.width, region.height)
                        .to_image();
                ScoredRegion {
                    region,
                    confidence: ink_density(&crop, page_level),
                }
            })
            .collect();

        tracing::debug!(
            lines = scored.len(),
            width = gray.width(),
            height = gray.height(),
            "Line segmentation completed in {:.2}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        observability::record_segmentation_metrics("segment_lines", scored.len());
        Ok(scored)
    }

    /// Detects word-like blobs, sorted top to bottom then left to right.
    ///
    /// # Errors
    ///
    /// Returns `SegmentationError` for empty or multi-channel input.
    pub fn segment_words(&self, image: &Image) -> Result<Vec<Region>, SegmentationError> {
        let _span = observability::segmentation_span("segment_words", 1).entered();

        diagnostics::clear_error();
        let gray = Self::validate_input(image).inspect_err(|e| {
            error_logging::log_segmentation_error(
                e,
                "segment_words",
                None,
                Some(image.dimensions()),
            );
            diagnostics::record_error(e.to_string());
        })?;
        let mask = ink_mask(&gray);

        let contours: Vec<Contour<u32>> = find_contours(&mask);
        let min_size = self.config.min_word_size;
        let mut words: Vec<Region> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Some(Region::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
            })
            .filter(|r| r.width > min_size && r.height > min_size)
            .collect();
        words.sort_by_key(|r| (r.y, r.x));

        tracing::debug!(words = words.len(), "Word segmentation completed");
        observability::record_segmentation_metrics("segment_words", words.len());
        Ok(words)
    }

    /// Runs [`Segmenter::segment_lines`] on every image in parallel.
    ///
    /// The output has one entry per input, in input order; a failing image only
    /// affects its own entry.
    pub fn segment_batch(
        &self,
        images: &[Image],
    ) -> Vec<Result<Vec<ScoredRegion>, SegmentationError>> {
        let _span = observability::segmentation_span("segment_batch", images.len()).entered();
        let start_time = Instant::now();

        let results: Vec<Result<Vec<ScoredRegion>, SegmentationError>> = images
            .par_iter()
            .enumerate()
            .map(|(index, image)| {
                self.segment_lines(image).inspect_err(|e| {
                    error_logging::log_segmentation_error(
                        e,
                        "segment_batch",
                        Some(index),
                        Some(image.dimensions()),
                    );
                })
            })
            .collect();

        let failures = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(
            images = images.len(),
            failures = failures,
            "Batch segmentation completed in {:.2}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        results
    }
}

/// Line detection with the default configuration.
pub fn detect_lines(image: &Image) -> Result<Vec<Region>, SegmentationError> {
    DEFAULT_SEGMENTER.detect_lines(image)
}

/// Scored line segmentation with the default configuration.
pub fn segment_lines(image: &Image) -> Result<Vec<ScoredRegion>, SegmentationError> {
    DEFAULT_SEGMENTER.segment_lines(image)
}

/// Word segmentation with the default configuration.
pub fn segment_words(image: &Image) -> Result<Vec<Region>, SegmentationError> {
    DEFAULT_SEGMENTER.segment_words(image)
}

/// Parallel batch line segmentation with the default configuration.
pub fn segment_batch(images: &[Image]) -> Vec<Result<Vec<ScoredRegion>, SegmentationError>> {
    DEFAULT_SEGMENTER.segment_batch(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_banded_image(bands: &[(u32, u32)]) -> Image {
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for &(top, rows) in bands {
            for y in top..top + rows {
                for x in 20..180 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        Image::from_gray(img)
    }

    #[test]
    fn test_three_bands_give_three_lines() {
        let image = create_banded_image(&[(10, 10), (45, 12), (85, 9)]);
        let lines = detect_lines(&image).expect("valid image");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], Region::new(20, 10, 160, 10));
        assert_eq!(lines[1], Region::new(20, 45, 160, 12));
        assert_eq!(lines[2], Region::new(20, 85, 160, 9));
    }

    #[test]
    fn test_short_bands_are_noise() {
        let image = create_banded_image(&[(10, 10), (60, 4)]);
        let lines = detect_lines(&image).expect("valid image");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].y, 10);
    }

    #[test]
    fn test_band_touching_bottom_edge_is_kept() {
        let image = create_banded_image(&[(110, 10)]);
        let lines = detect_lines(&image).expect("valid image");
        assert_eq!(lines, vec![Region::new(20, 110, 160, 10)]);
    }

    #[test]
    fn test_blank_image_has_no_lines() {
        for value in [0u8, 40, 100, 200, 255] {
            let image = Image::from_gray(GrayImage::from_pixel(100, 50, Luma([value])));
            assert!(detect_lines(&image).expect("valid image").is_empty());
            assert!(segment_lines(&image).expect("valid image").is_empty());
            assert!(segment_words(&image).expect("valid image").is_empty());
        }
    }

    #[test]
    fn test_solid_line_has_full_density() {
        let image = create_banded_image(&[(10, 10)]);
        let scored = segment_lines(&image).expect("valid image");
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].confidence, 1.0);
    }

    #[test]
    fn test_scored_lines_are_within_unit_interval() {
        let image = create_banded_image(&[(10, 10), (45, 12)]);
        let scored = segment_lines(&image).expect("valid image");
        assert_eq!(scored.len(), 2);
        for line in scored {
            assert!((0.0..=1.0).contains(&line.confidence));
            assert!(line.region.fits_within(200, 120));
        }
    }

    #[test]
    fn test_rejects_empty_and_colour_input() {
        assert_eq!(segment_lines(&Image::empty()), Err(SegmentationError::EmptyImage));
        let rgb = Image::from_raw(4, 4, 3, vec![0; 48]).expect("valid buffer");
        assert_eq!(
            segment_words(&rgb),
            Err(SegmentationError::UnsupportedChannels { channels: 3 })
        );
    }

    #[test]
    fn test_words_filter_small_blobs() {
        let mut img = GrayImage::from_pixel(100, 60, Luma([255]));
        for y in 10..30 {
            for x in 10..40 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 40..44 {
            for x in 60..64 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let words = segment_words(&Image::from_gray(img)).expect("valid image");
        assert_eq!(words, vec![Region::new(10, 10, 30, 20)]);
    }

    #[test]
    fn test_region_bounds() {
        let region = Region::new(5, 5, 10, 10);
        assert_eq!(region.area(), 100);
        assert!(region.fits_within(15, 15));
        assert!(!region.fits_within(14, 15));
        assert!(!Region::new(0, 0, 0, 3).fits_within(10, 10));
    }
}
