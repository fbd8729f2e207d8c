//! # docscan
//!
//! Document image normalization, region segmentation and field extraction for OCR.
//!
//! A photographed page flows through:
//!
//! 1. [`preprocessing`]: grayscale, upscale, then denoise, threshold, deskew and
//!    dewarp stages, each with a primary and a fallback strategy
//! 2. [`segmentation`]: line and word regions with ink-density scores
//! 3. [`ocr`]: per-region recognition through any [`ocr::RecognitionEngine`]
//! 4. [`field_extraction`]: invoice number, date and total from the recognized text

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod field_extraction;
pub mod instance_manager;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_errors;
pub mod preprocessing;
pub mod raster;
pub mod segmentation;
#[cfg(feature = "tesseract")]
pub mod tesseract;

// Re-export types for easier access
pub use errors::{AppError, AppResult};
pub use field_extraction::{extract_fields, FieldMap, FieldName};
pub use ocr::{recognize_regions, RecognitionEngine, RecognitionResult};
pub use preprocessing::{preprocess, preprocess_path, PipelineMode, PipelineReport};
pub use raster::Image;
pub use segmentation::{
    segment_batch, segment_lines, segment_words, Region, ScoredRegion, SegmentationError,
};
