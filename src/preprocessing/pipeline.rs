//! # Preprocessing Pipeline
//!
//! Sequences the normalization stages for the two pipeline variants:
//!
//! - **Baseline**: grayscale, ×1.5 resize, Gaussian adaptive threshold, minimum-area
//!   rectangle deskew. Each stage has a single strategy; a failing stage passes its
//!   input through.
//! - **Enhanced**: grayscale, ×1.5 resize, then the hybrid denoise, threshold, deskew
//!   and dewarp stages.
//! - **Full**: the enhanced sequence preceded by auto-orientation, border removal and
//!   contrast enhancement.
//!
//! Background removal is only available as a stand-alone stage.
//!
//! Stage problems never abort a run. Only a missing, undecodable or empty source
//! image is reported as an error.

use std::path::Path;
use std::time::Instant;

use lazy_static::lazy_static;

use super::deskewing::{DeskewSearch, MinAreaRectDeskew, ProjectionProfileDeskew};
use super::dewarping::{ForegroundCropDewarp, QuadPerspectiveDewarp};
use super::enhancement::{
    BackgroundRemoval, BorderTrim, ContrastEnhancement, ProjectionOrientation,
};
use super::filtering::{MorphologicalDenoise, SmoothingDenoise};
use super::scaling::ImageScaler;
use super::strategy::StrategyStage;
use super::thresholding::{DocumentThreshold, GaussianAdaptiveThreshold};
use super::types::{PipelineMode, PipelineReport, PreprocessingError, StageKind, StageResult};
use crate::config::PreprocessingConfig;
use crate::diagnostics;
use crate::errors::{error_logging, AppResult};
use crate::observability;
use crate::raster::Image;

lazy_static! {
    static ref DEFAULT_PREPROCESSOR: Preprocessor = Preprocessor::default();
}

/// Owns the configured stages of both pipelines.
///
/// Primary availability is probed once when the preprocessor is built. A primary
/// that later fails on a particular image falls back for that call only.
#[derive(Debug)]
pub struct Preprocessor {
    config: PreprocessingConfig,
    scaler: ImageScaler,
    baseline_threshold: StrategyStage,
    baseline_deskew: StrategyStage,
    denoise: StrategyStage,
    threshold: StrategyStage,
    deskew: StrategyStage,
    dewarp: StrategyStage,
    orient: StrategyStage,
    borders: StrategyStage,
    contrast: StrategyStage,
    background: StrategyStage,
}

impl Preprocessor {
    /// Builds a preprocessor after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if any parameter is out of range.
    pub fn new(config: PreprocessingConfig) -> AppResult<Self> {
        config.validate().inspect_err(|e| {
            error_logging::log_config_error(e, "preprocessing", "Preprocessor::new");
        })?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PreprocessingConfig) -> Self {
        let scaler = ImageScaler::with_scale_factor(config.scale_factor).unwrap_or_default();
        let search = DeskewSearch {
            max_angle: config.deskew_max_angle,
            coarse_step: config.deskew_coarse_step,
            fine_step: config.deskew_fine_step,
        };
        let gaussian_threshold = || GaussianAdaptiveThreshold {
            block_size: config.adaptive_block_size,
            bias: config.adaptive_bias,
        };
        let rect_deskew = || MinAreaRectDeskew {
            min_angle: config.deskew_min_angle,
        };

        Self {
            scaler,
            baseline_threshold: StrategyStage::single(
                StageKind::Threshold,
                Box::new(gaussian_threshold()),
            ),
            baseline_deskew: StrategyStage::single(StageKind::Deskew, Box::new(rect_deskew())),
            denoise: StrategyStage::new(
                StageKind::Denoise,
                Box::new(MorphologicalDenoise {
                    open_radius: config.open_radius,
                    close_radius: config.close_radius,
                    enabled: config.primary_enabled,
                }),
                Box::new(SmoothingDenoise {
                    median_radius: config.median_radius,
                    bilateral_window: config.bilateral_window,
                    sigma_color: config.bilateral_sigma_color,
                    sigma_space: config.bilateral_sigma_space,
                }),
            ),
            threshold: StrategyStage::new(
                StageKind::Threshold,
                Box::new(DocumentThreshold {
                    tile_size: config.local_tile_size,
                    enabled: config.primary_enabled,
                }),
                Box::new(gaussian_threshold()),
            ),
            deskew: StrategyStage::new(
                StageKind::Deskew,
                Box::new(ProjectionProfileDeskew {
                    search,
                    min_angle: config.deskew_min_angle,
                    enabled: config.primary_enabled,
                }),
                Box::new(rect_deskew()),
            ),
            dewarp: StrategyStage::new(
                StageKind::Dewarp,
                Box::new(ForegroundCropDewarp {
                    enabled: config.primary_enabled,
                }),
                Box::new(QuadPerspectiveDewarp {
                    threshold_radius: config.adaptive_block_size / 2,
                    threshold_bias: config.dewarp_threshold_bias,
                    epsilon: config.dewarp_epsilon,
                }),
            ),
            orient: StrategyStage::single(StageKind::Orient, Box::new(ProjectionOrientation)),
            borders: StrategyStage::single(
                StageKind::BorderRemoval,
                Box::new(BorderTrim {
                    margin_ratio: config.border_margin_ratio,
                }),
            ),
            contrast: StrategyStage::single(
                StageKind::Contrast,
                Box::new(ContrastEnhancement {
                    gamma: config.contrast_gamma,
                }),
            ),
            background: StrategyStage::single(
                StageKind::BackgroundRemoval,
                Box::new(BackgroundRemoval {
                    radius: config.background_radius,
                    bias: config.background_bias,
                }),
            ),
            config,
        }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// True when every hybrid stage found its primary strategy usable at construction.
    pub fn primary_available(&self) -> bool {
        [&self.denoise, &self.threshold, &self.deskew, &self.dewarp]
            .iter()
            .all(|stage| stage.is_primary_available())
    }

    /// The stage used for `kind` by the enhanced and full pipelines.
    pub fn stage(&self, kind: StageKind) -> &StrategyStage {
        match kind {
            StageKind::Denoise => &self.denoise,
            StageKind::Threshold => &self.threshold,
            StageKind::Deskew => &self.deskew,
            StageKind::Dewarp => &self.dewarp,
            StageKind::Orient => &self.orient,
            StageKind::BorderRemoval => &self.borders,
            StageKind::Contrast => &self.contrast,
            StageKind::BackgroundRemoval => &self.background,
        }
    }

    /// Hybrid threshold stage on its own.
    pub fn threshold(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.threshold.apply(image)
    }

    /// Hybrid deskew stage on its own.
    pub fn deskew(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.deskew.apply(image)
    }

    /// Hybrid dewarp stage on its own.
    pub fn dewarp(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.dewarp.apply(image)
    }

    /// Hybrid denoise stage on its own.
    pub fn denoise(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.denoise.apply(image)
    }

    /// Quarter-turn orientation correction on its own.
    pub fn orient(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.orient.apply(image)
    }

    /// Crop to the content box with a proportional margin.
    pub fn remove_borders(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.borders.apply(image)
    }

    /// Histogram equalization and gamma correction.
    pub fn enhance_contrast(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.contrast.apply(image)
    }

    /// Mean adaptive binarization with background opening.
    pub fn remove_background(&self, image: &Image) -> StageResult {
        diagnostics::clear_error();
        self.background.apply(image)
    }

    /// Runs the selected pipeline on an already-decoded image.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessingError::InvalidInput` if the image is empty or its buffer
    /// is inconsistent. Stage failures are never returned; they show up in the
    /// report's stage outcomes instead.
    pub fn preprocess(
        &self,
        image: &Image,
        mode: PipelineMode,
    ) -> Result<PipelineReport, PreprocessingError> {
        diagnostics::clear_error();
        let _span = observability::pipeline_span(mode).entered();
        let start_time = Instant::now();

        match self.run_pipeline(image, mode, start_time) {
            Ok(report) => {
                let summary = report.timing_summary();
                tracing::info!(
                    mode = mode.as_str(),
                    width = report.image.width(),
                    height = report.image.height(),
                    degraded_stages = report.degraded_stages(),
                    "{}",
                    summary
                );
                diagnostics::record_timing(summary);
                observability::record_pipeline_metrics(mode, true, report.elapsed);
                Ok(report)
            }
            Err(e) => {
                let elapsed = start_time.elapsed();
                error_logging::log_pipeline_error(&e, mode.pipeline_name(), None, Some(elapsed));
                diagnostics::record_error(e.to_string());
                observability::record_pipeline_metrics(mode, false, elapsed);
                Err(e)
            }
        }
    }

    fn run_pipeline(
        &self,
        image: &Image,
        mode: PipelineMode,
        start_time: Instant,
    ) -> Result<PipelineReport, PreprocessingError> {
        if image.is_empty() {
            return Err(PreprocessingError::InvalidInput {
                message: "source image is empty".to_string(),
            });
        }

        let gray = image.to_gray_image()?;
        let scaled = Image::from_gray(self.scaler.scale(&gray));

        let stages: Vec<&StrategyStage> = match mode {
            PipelineMode::Baseline => vec![&self.baseline_threshold, &self.baseline_deskew],
            PipelineMode::Enhanced => {
                vec![&self.denoise, &self.threshold, &self.deskew, &self.dewarp]
            }
            PipelineMode::Full => vec![
                &self.orient,
                &self.borders,
                &self.contrast,
                &self.denoise,
                &self.threshold,
                &self.deskew,
                &self.dewarp,
            ],
        };

        let mut current = scaled;
        let mut outcomes = Vec::with_capacity(stages.len());
        for stage in stages {
            let result = stage.apply(&current);
            current = result.image;
            outcomes.push(result.outcome);
        }

        Ok(PipelineReport {
            mode,
            image: current,
            stages: outcomes,
            elapsed: start_time.elapsed(),
        })
    }

    /// Loads an image file and runs the selected pipeline on it.
    ///
    /// # Errors
    ///
    /// - `PreprocessingError::InvalidInput` if the file does not exist or is empty
    /// - `PreprocessingError::ImageLoad` if the file cannot be decoded
    pub fn preprocess_path(
        &self,
        path: impl AsRef<Path>,
        mode: PipelineMode,
    ) -> Result<PipelineReport, PreprocessingError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let loaded = if !path.exists() {
            Err(PreprocessingError::InvalidInput {
                message: format!("file not found: {}", source),
            })
        } else {
            image::open(path)
                .map(Image::from_dynamic)
                .map_err(|e| PreprocessingError::ImageLoad {
                    message: format!("{}: {}", source, e),
                })
        };

        match loaded {
            Ok(image) => self.preprocess(&image, mode),
            Err(e) => {
                error_logging::log_pipeline_error(&e, mode.pipeline_name(), Some(&source), None);
                diagnostics::record_error(e.to_string());
                observability::record_pipeline_metrics(mode, false, std::time::Duration::ZERO);
                Err(e)
            }
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_valid_config(PreprocessingConfig::default())
    }
}

/// Runs a pipeline with the default configuration.
pub fn preprocess(image: &Image, mode: PipelineMode) -> Result<PipelineReport, PreprocessingError> {
    DEFAULT_PREPROCESSOR.preprocess(image, mode)
}

/// Loads a file and runs a pipeline with the default configuration.
pub fn preprocess_path(
    path: impl AsRef<Path>,
    mode: PipelineMode,
) -> Result<PipelineReport, PreprocessingError> {
    DEFAULT_PREPROCESSOR.preprocess_path(path, mode)
}

/// Whether the default preprocessor's primary strategies are all usable.
pub fn primary_available() -> bool {
    DEFAULT_PREPROCESSOR.primary_available()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::StrategyPath;
    use image::{GrayImage, Luma};

    fn create_document_image() -> Image {
        let mut img = GrayImage::from_pixel(120, 80, Luma([235]));
        for base in [15u32, 35, 55] {
            for y in base..base + 8 {
                for x in 10..110 {
                    if x % 12 < 9 {
                        img.put_pixel(x, y, Luma([25]));
                    }
                }
            }
        }
        Image::from_gray(img)
    }

    #[test]
    fn test_baseline_runs_two_stages() {
        let preprocessor = Preprocessor::default();
        let report = preprocessor
            .preprocess(&create_document_image(), PipelineMode::Baseline)
            .expect("baseline should succeed");
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].stage, StageKind::Threshold);
        assert_eq!(report.stages[1].stage, StageKind::Deskew);
        assert_eq!(report.image.dimensions(), (180, 120));
    }

    #[test]
    fn test_enhanced_runs_four_stages_in_order() {
        let preprocessor = Preprocessor::default();
        assert!(preprocessor.primary_available());
        let report = preprocessor
            .preprocess(&create_document_image(), PipelineMode::Enhanced)
            .expect("enhanced should succeed");
        let kinds: Vec<StageKind> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Denoise,
                StageKind::Threshold,
                StageKind::Deskew,
                StageKind::Dewarp
            ]
        );
        assert!(!report.image.is_empty());
        assert!(report.stages.iter().all(|s| s.path == StrategyPath::Primary));
    }

    #[test]
    fn test_full_runs_enhancement_stages_first() {
        let preprocessor = Preprocessor::default();
        let report = preprocessor
            .preprocess(&create_document_image(), PipelineMode::Full)
            .expect("full should succeed");
        let kinds: Vec<StageKind> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Orient,
                StageKind::BorderRemoval,
                StageKind::Contrast,
                StageKind::Denoise,
                StageKind::Threshold,
                StageKind::Deskew,
                StageKind::Dewarp
            ]
        );
        assert!(!report.image.is_empty());
        assert_eq!(report.degraded_stages(), 0);
        assert!(report
            .timing_summary()
            .starts_with("full_preprocess_pipeline: "));
    }

    #[test]
    fn test_stage_lookup_covers_enhancement_stages() {
        let preprocessor = Preprocessor::default();
        assert_eq!(
            preprocessor.stage(StageKind::Orient).primary_name(),
            "projection_orientation"
        );
        assert_eq!(
            preprocessor.stage(StageKind::BackgroundRemoval).fallback_name(),
            None
        );
    }

    #[test]
    fn test_disabled_primaries_use_fallbacks() {
        let config = PreprocessingConfig {
            primary_enabled: false,
            ..Default::default()
        };
        let preprocessor = Preprocessor::new(config).expect("valid config");
        assert!(!preprocessor.primary_available());

        let report = preprocessor
            .preprocess(&create_document_image(), PipelineMode::Enhanced)
            .expect("enhanced should succeed");
        assert!(report.stages[..3]
            .iter()
            .all(|s| s.path == StrategyPath::Fallback));
        assert_ne!(report.stages[3].path, StrategyPath::Primary);
        assert_eq!(report.degraded_stages(), 4);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let result = Preprocessor::default().preprocess(&Image::empty(), PipelineMode::Enhanced);
        assert!(matches!(
            result,
            Err(PreprocessingError::InvalidInput { .. })
        ));
        assert!(!diagnostics::last_error().is_empty());
    }

    #[test]
    fn test_success_clears_last_error_and_records_timing() {
        let preprocessor = Preprocessor::default();
        let _ = preprocessor.preprocess(&Image::empty(), PipelineMode::Baseline);
        let report = preprocessor
            .preprocess(&create_document_image(), PipelineMode::Baseline)
            .expect("baseline should succeed");
        assert!(diagnostics::last_error().is_empty());
        assert_eq!(diagnostics::last_timing(), report.timing_summary());
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let result = preprocess_path("/definitely/not/here.png", PipelineMode::Baseline);
        assert!(matches!(
            result,
            Err(PreprocessingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PreprocessingConfig {
            adaptive_block_size: 4,
            ..Default::default()
        };
        assert!(Preprocessor::new(config).is_err());
    }
}
