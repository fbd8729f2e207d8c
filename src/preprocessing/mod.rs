//! # Image Preprocessing Module
//!
//! Normalizes document photographs before segmentation and recognition.
//!
//! The module is organized into focused sub-modules:
//! - `types`: Shared error type, stage outcomes and pipeline reports
//! - `scaling`: Fixed-factor upscaling
//! - `thresholding`: Otsu, local Otsu and adaptive binarization
//! - `filtering`: Morphological and smoothing noise reduction
//! - `geometry`: Hulls, rotated rectangles and polygon helpers
//! - `deskewing`: Skew estimation and rotation
//! - `dewarping`: Foreground cropping and perspective rectification
//! - `enhancement`: Orientation, border removal, contrast and background removal
//! - `strategy`: Primary/fallback stage orchestration
//! - `pipeline`: Baseline, enhanced and full pipelines

pub mod deskewing;
pub mod dewarping;
pub mod enhancement;
pub mod filtering;
pub mod geometry;
pub mod pipeline;
pub mod scaling;
pub mod strategy;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    PipelineMode, PipelineReport, PreprocessingError, StageKind, StageOutcome, StageResult,
    StrategyPath,
};

pub use deskewing::{DeskewSearch, MinAreaRectDeskew, ProjectionProfileDeskew};
pub use dewarping::{ForegroundCropDewarp, QuadPerspectiveDewarp};
pub use enhancement::{BackgroundRemoval, BorderTrim, ContrastEnhancement, ProjectionOrientation};
pub use filtering::{MorphologicalDenoise, SmoothingDenoise};
pub use pipeline::{preprocess, preprocess_path, primary_available, Preprocessor};
pub use scaling::ImageScaler;
pub use strategy::{Strategy, StrategyStage};
pub use thresholding::{apply_otsu_threshold, otsu_level, DocumentThreshold, GaussianAdaptiveThreshold};
