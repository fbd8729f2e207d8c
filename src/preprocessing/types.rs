//! # Shared Types for Image Preprocessing
//!
//! This module contains the error type, the per-stage result records and the
//! pipeline report shared across the preprocessing sub-modules.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::raster::Image;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// Malformed or empty image, wrong channel count, or missing file
    InvalidInput { message: String },
    /// A primary strategy cannot be used at all (disabled or missing capability)
    CapabilityUnavailable { capability: String },
    /// Image processing operation failed on a specific image
    ProcessingFailed { message: String },
    /// Failed to load or decode the source image
    ImageLoad { message: String },
}

impl fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessingError::InvalidInput { message } => {
                write!(f, "Invalid input image: {}", message)
            }
            PreprocessingError::CapabilityUnavailable { capability } => {
                write!(f, "Capability unavailable: {}", capability)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
            PreprocessingError::ImageLoad { message } => {
                write!(f, "Failed to load image: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// The normalization steps a strategy stage can implement.
///
/// The first four are hybrid stages with a primary and a fallback; the page
/// enhancement steps run a single strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Threshold,
    Deskew,
    Dewarp,
    Denoise,
    Orient,
    BorderRemoval,
    Contrast,
    BackgroundRemoval,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Threshold => "threshold",
            StageKind::Deskew => "deskew",
            StageKind::Dewarp => "dewarp",
            StageKind::Denoise => "denoise",
            StageKind::Orient => "orient",
            StageKind::BorderRemoval => "border_removal",
            StageKind::Contrast => "contrast",
            StageKind::BackgroundRemoval => "background_removal",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of a strategy stage produced its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyPath {
    /// The primary algorithm succeeded
    Primary,
    /// The primary was unavailable or failed and the fallback succeeded
    Fallback,
    /// Every strategy failed; the input was passed through unchanged
    Identity,
    /// The input was empty; nothing ran
    Skipped,
}

impl StrategyPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyPath::Primary => "primary",
            StrategyPath::Fallback => "fallback",
            StrategyPath::Identity => "identity",
            StrategyPath::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StrategyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics for a single stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// Stage that ran
    pub stage: StageKind,
    /// Name of the strategy whose output was kept ("identity" when none)
    pub strategy: &'static str,
    /// Branch taken
    pub path: StrategyPath,
    /// Wall-clock time spent in the stage
    pub elapsed: Duration,
    /// Error text from the failed strategies, if any
    pub note: Option<String>,
}

impl StageOutcome {
    /// Renders the `"<stage> (<path>, <strategy>): <ms> ms"` timing line.
    pub fn timing_line(&self) -> String {
        format!(
            "{} ({}, {}): {:.3} ms",
            self.stage,
            self.path,
            self.strategy,
            self.elapsed.as_secs_f64() * 1000.0
        )
    }
}

/// Output of a strategy stage: a new image plus how it was produced.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// The stage output (never aliases the input buffer)
    pub image: Image,
    /// Path, timing and error note for this invocation
    pub outcome: StageOutcome,
}

/// Pipeline variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// grayscale, resize, threshold, deskew; no fallbacks
    Baseline,
    /// grayscale, resize, denoise, threshold, deskew, dewarp; every stage hybrid
    #[default]
    Enhanced,
    /// grayscale, resize, orient, border removal, contrast, then the enhanced stages
    Full,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Baseline => "baseline",
            PipelineMode::Enhanced => "enhanced",
            PipelineMode::Full => "full",
        }
    }

    /// Name used in timing lines and tracing spans.
    pub fn pipeline_name(&self) -> &'static str {
        match self {
            PipelineMode::Baseline => "baseline_preprocess_pipeline",
            PipelineMode::Enhanced => "enhanced_preprocess_pipeline",
            PipelineMode::Full => "full_preprocess_pipeline",
        }
    }
}

impl std::str::FromStr for PipelineMode {
    type Err = PreprocessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(PipelineMode::Baseline),
            "enhanced" => Ok(PipelineMode::Enhanced),
            "full" => Ok(PipelineMode::Full),
            other => Err(PreprocessingError::InvalidInput {
                message: format!("unknown pipeline mode '{}'", other),
            }),
        }
    }
}

/// Result of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Pipeline variant that ran
    pub mode: PipelineMode,
    /// Normalized output image
    pub image: Image,
    /// One entry per strategy stage, in execution order
    pub stages: Vec<StageOutcome>,
    /// Total wall-clock time including grayscale and resize
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Renders the `"<pipeline>: <ms> ms"` line also stored as the thread's last timing.
    pub fn timing_summary(&self) -> String {
        format!(
            "{}: {:.3} ms",
            self.mode.pipeline_name(),
            self.elapsed.as_secs_f64() * 1000.0
        )
    }

    /// Number of stages that did not take their primary path.
    pub fn degraded_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s.path, StrategyPath::Fallback | StrategyPath::Identity))
            .count()
    }

    pub fn into_image(self) -> Image {
        self.image
    }
}
