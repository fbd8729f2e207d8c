//! # Application Error Types
//!
//! This module defines the umbrella error type used at the crate's outer surface
//! and the structured error logging helpers shared by the pipeline, the
//! segmentation engine and the recognition batch.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Malformed or empty input images
    Input(String),
    /// Preprocessing pipeline errors
    Preprocessing(String),
    /// Region segmentation errors
    Segmentation(String),
    /// Recognition engine errors
    Ocr(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Input(msg) => write!(f, "[INPUT] {}", msg),
            AppError::Preprocessing(msg) => write!(f, "[PREPROCESSING] {}", msg),
            AppError::Segmentation(msg) => write!(f, "[SEGMENTATION] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::preprocessing::PreprocessingError> for AppError {
    fn from(err: crate::preprocessing::PreprocessingError) -> Self {
        match err {
            crate::preprocessing::PreprocessingError::InvalidInput { message } => {
                AppError::Input(message)
            }
            other => AppError::Preprocessing(other.to_string()),
        }
    }
}

impl From<crate::segmentation::SegmentationError> for AppError {
    fn from(err: crate::segmentation::SegmentationError) -> Self {
        AppError::Segmentation(err.to_string())
    }
}

impl From<crate::ocr_errors::OcrError> for AppError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AppError::Ocr(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the crate
pub mod error_logging {
    use tracing::{error, warn};

    /// Log a strategy stage that could not use its primary algorithm
    pub fn log_stage_fallback(
        error: &impl std::fmt::Display,
        stage: &str,
        primary: &str,
        fallback: Option<&str>,
    ) {
        warn!(
            error = %error,
            stage = %stage,
            primary = %primary,
            fallback = ?fallback,
            "Primary strategy failed, falling back"
        );
    }

    /// Log a strategy stage where every strategy failed and the input is passed through
    pub fn log_stage_identity(error: &impl std::fmt::Display, stage: &str, dimensions: (u32, u32)) {
        warn!(
            error = %error,
            stage = %stage,
            width = dimensions.0,
            height = dimensions.1,
            "All strategies failed, passing image through unchanged"
        );
    }

    /// Log pipeline-entry failures (the pipeline never ran)
    pub fn log_pipeline_error(
        error: &impl std::fmt::Display,
        operation: &str,
        source: Option<&str>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            source = ?source,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Preprocessing pipeline failed"
        );
    }

    /// Log per-image segmentation errors with batch context
    pub fn log_segmentation_error(
        error: &impl std::fmt::Display,
        operation: &str,
        batch_index: Option<usize>,
        dimensions: Option<(u32, u32)>,
    ) {
        warn!(
            error = %error,
            operation = %operation,
            batch_index = ?batch_index,
            dimensions = ?dimensions,
            "Segmentation failed"
        );
    }

    /// Log per-region recognition errors
    pub fn log_recognition_error(
        error: &impl std::fmt::Display,
        operation: &str,
        region_index: Option<usize>,
    ) {
        warn!(
            error = %error,
            operation = %operation,
            region_index = ?region_index,
            "Recognition failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr_errors::OcrError;
    use crate::preprocessing::PreprocessingError;
    use crate::segmentation::SegmentationError;

    #[test]
    fn test_app_error_display_prefixes() {
        assert_eq!(
            AppError::Config("bad".to_string()).to_string(),
            "[CONFIG] bad"
        );
        assert_eq!(AppError::Input("x".to_string()).to_string(), "[INPUT] x");
    }

    #[test]
    fn test_invalid_input_maps_to_input_error() {
        let err: AppError = PreprocessingError::InvalidInput {
            message: "empty image".to_string(),
        }
        .into();
        assert_eq!(err, AppError::Input("empty image".to_string()));
    }

    #[test]
    fn test_image_load_maps_to_preprocessing_error() {
        let err: AppError = PreprocessingError::ImageLoad {
            message: "missing.png".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Preprocessing(msg) if msg.contains("missing.png")));
    }

    #[test]
    fn test_segmentation_and_ocr_conversions() {
        let seg: AppError = SegmentationError::EmptyImage.into();
        assert!(matches!(seg, AppError::Segmentation(_)));

        let ocr: AppError = OcrError::Extraction("engine crashed".to_string()).into();
        assert!(matches!(ocr, AppError::Ocr(msg) if msg.contains("engine crashed")));
    }
}
