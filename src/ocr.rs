//! # Region Recognition Module
//!
//! The contract between the segmentation output and a character recognition engine,
//! plus the parallel driver that feeds regions to it.
//!
//! An engine turns one single-channel crop into text and a confidence in `[0, 1]`.
//! Engines may keep per-instance state, so they are never shared between workers
//! without a lock: [`recognize_regions`] builds one engine per rayon worker, and
//! [`recognize_regions_shared`] serializes calls through a
//! [`SharedEngine`](crate::instance_manager::SharedEngine).

use std::time::Instant;

use image::{imageops, GrayImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::error_logging;
use crate::instance_manager::SharedEngine;
use crate::observability;
use crate::ocr_errors::OcrError;
use crate::raster::Image;
use crate::segmentation::Region;

/// Text recognized in a single region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Mean engine confidence, always within `[0, 1]`
    pub confidence: f32,
}

impl RecognitionResult {
    /// Creates a result, clamping `confidence` into `[0, 1]` (NaN becomes 0).
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A character recognition engine.
pub trait RecognitionEngine {
    /// Recognizes the text in a single-channel region crop.
    ///
    /// # Errors
    ///
    /// Returns an `OcrError` with a human-readable reason when recognition fails.
    fn recognize(&mut self, region: &GrayImage) -> Result<RecognitionResult, OcrError>;
}

/// Copies `region` out of `image` as an owned single-channel raster.
///
/// Colour images are converted to luma first.
///
/// # Errors
///
/// Returns `OcrError::Validation` when the region is empty or extends past the image.
pub fn crop_region(image: &Image, region: &Region) -> Result<GrayImage, OcrError> {
    if image.is_empty() {
        return Err(OcrError::Validation("source image is empty".to_string()));
    }
    if !region.fits_within(image.width(), image.height()) {
        return Err(OcrError::Validation(format!(
            "region {}x{} at ({}, {}) does not fit in {}x{} image",
            region.width,
            region.height,
            region.x,
            region.y,
            image.width(),
            image.height()
        )));
    }
    let gray = image
        .to_gray_image()
        .map_err(|e| OcrError::ImageLoad(e.to_string()))?;
    Ok(imageops::crop_imm(&gray, region.x, region.y, region.width, region.height).to_image())
}

fn recognize_one<E: RecognitionEngine>(
    engine: &mut E,
    image: &Image,
    region: &Region,
) -> Result<RecognitionResult, OcrError> {
    let crop = crop_region(image, region)?;
    let result = engine.recognize(&crop)?;
    Ok(RecognitionResult::new(result.text, result.confidence))
}

fn finish_batch(
    operation: &str,
    results: &[Result<RecognitionResult, OcrError>],
    start_time: Instant,
) {
    let failures = results.iter().filter(|r| r.is_err()).count();
    let elapsed = start_time.elapsed();
    tracing::info!(
        operation = operation,
        regions = results.len(),
        failures = failures,
        "Region recognition completed in {:.2}ms",
        elapsed.as_secs_f64() * 1000.0
    );
    observability::record_ocr_metrics(results.len(), failures, elapsed);
}

/// Recognizes every region in parallel, one engine per rayon worker.
///
/// `factory` builds an engine the first time a worker needs one. Results are in
/// region order; a failure only affects its own entry, and a worker whose engine
/// could not be built reports that error for each region it handles.
pub fn recognize_regions<E, F>(
    image: &Image,
    regions: &[Region],
    factory: F,
) -> Vec<Result<RecognitionResult, OcrError>>
where
    E: RecognitionEngine,
    F: Fn() -> Result<E, OcrError> + Sync + Send,
{
    let _span = observability::ocr_span("recognize_regions", regions.len()).entered();
    let start_time = Instant::now();

    let results: Vec<Result<RecognitionResult, OcrError>> = regions
        .par_iter()
        .enumerate()
        .map_init(&factory, |engine, (index, region)| {
            let result = match engine {
                Ok(engine) => recognize_one(engine, image, region),
                Err(e) => Err(e.clone()),
            };
            result.inspect_err(|e| {
                error_logging::log_recognition_error(e, "recognize_regions", Some(index));
            })
        })
        .collect();

    finish_batch("recognize_regions", &results, start_time);
    results
}

/// Recognizes every region through one engine guarded by a lock.
///
/// Regions are cropped in parallel; recognition calls are serialized by the lock.
pub fn recognize_regions_shared<E>(
    image: &Image,
    regions: &[Region],
    engine: &SharedEngine<E>,
) -> Vec<Result<RecognitionResult, OcrError>>
where
    E: RecognitionEngine + Send,
{
    let _span = observability::ocr_span("recognize_regions_shared", regions.len()).entered();
    let start_time = Instant::now();

    let results: Vec<Result<RecognitionResult, OcrError>> = regions
        .par_iter()
        .enumerate()
        .map(|(index, region)| {
            crop_region(image, region)
                .and_then(|crop| engine.recognize(&crop))
                .map(|r| RecognitionResult::new(r.text, r.confidence))
                .inspect_err(|e| {
                    error_logging::log_recognition_error(
                        e,
                        "recognize_regions_shared",
                        Some(index),
                    );
                })
        })
        .collect();

    finish_batch("recognize_regions_shared", &results, start_time);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Reports the crop size as text and its mean brightness as confidence.
    struct SizeEngine;

    impl RecognitionEngine for SizeEngine {
        fn recognize(&mut self, region: &GrayImage) -> Result<RecognitionResult, OcrError> {
            let sum: u64 = region.pixels().map(|p| p[0] as u64).sum();
            let mean = sum as f32 / (region.width() * region.height()) as f32 / 255.0;
            Ok(RecognitionResult::new(
                format!("{}x{}", region.width(), region.height()),
                mean,
            ))
        }
    }

    struct OverconfidentEngine;

    impl RecognitionEngine for OverconfidentEngine {
        fn recognize(&mut self, _region: &GrayImage) -> Result<RecognitionResult, OcrError> {
            Ok(RecognitionResult {
                text: "x".to_string(),
                confidence: 7.5,
            })
        }
    }

    fn create_page() -> Image {
        Image::from_gray(GrayImage::from_pixel(60, 40, Luma([255])))
    }

    #[test]
    fn test_crop_region_bounds() {
        let page = create_page();
        let crop = crop_region(&page, &Region::new(10, 5, 20, 10)).expect("region fits");
        assert_eq!(crop.dimensions(), (20, 10));
        assert!(matches!(
            crop_region(&page, &Region::new(50, 0, 20, 10)),
            Err(OcrError::Validation(_))
        ));
        assert!(matches!(
            crop_region(&Image::empty(), &Region::new(0, 0, 1, 1)),
            Err(OcrError::Validation(_))
        ));
    }

    #[test]
    fn test_recognize_regions_preserves_order() {
        let page = create_page();
        let regions: Vec<Region> = (1..=8).map(|w| Region::new(0, 0, w, 2)).collect();
        let results = recognize_regions(&page, &regions, || Ok(SizeEngine));
        let texts: Vec<String> = results
            .into_iter()
            .map(|r| r.expect("recognition succeeds").text)
            .collect();
        let expected: Vec<String> = (1..=8).map(|w| format!("{}x2", w)).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_bad_region_only_fails_its_slot() {
        let page = create_page();
        let regions = vec![
            Region::new(0, 0, 10, 10),
            Region::new(55, 35, 10, 10),
            Region::new(5, 5, 10, 10),
        ];
        let results = recognize_regions(&page, &regions, || Ok(SizeEngine));
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let page = create_page();
        let results = recognize_regions(&page, &[Region::new(0, 0, 4, 4)], || {
            Ok(OverconfidentEngine)
        });
        let result = results[0].as_ref().expect("recognition succeeds");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(RecognitionResult::new("", f32::NAN).confidence, 0.0);
    }

    #[test]
    fn test_factory_failure_is_reported_per_region() {
        let page = create_page();
        let regions = vec![Region::new(0, 0, 4, 4), Region::new(4, 4, 4, 4)];
        let results = recognize_regions::<SizeEngine, _>(&page, &regions, || {
            Err(OcrError::Initialization("no language data".to_string()))
        });
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(OcrError::Initialization(_)))));
    }

    #[test]
    fn test_shared_engine_recognition() {
        let page = create_page();
        let engine = SharedEngine::new(SizeEngine);
        let results = recognize_regions_shared(&page, &[Region::new(0, 0, 6, 3)], &engine);
        assert_eq!(results[0].as_ref().expect("succeeds").text, "6x3");
    }
}
