//! # Unified Application Configuration
//!
//! Tunable parameters for the preprocessing stages and the segmentation engine,
//! loaded from `DOCSCAN_*` environment variables with parse-or-error semantics and
//! validated before use.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;

/// Reads `key`, falling back to `default` when unset, and reports a config error
/// when the value does not parse.
fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

/// Preprocessing stage parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Upscale factor applied before the strategy stages
    pub scale_factor: f32,
    /// Neighbourhood size of the Gaussian adaptive threshold (odd)
    pub adaptive_block_size: u32,
    /// Constant subtracted from the local mean by adaptive thresholds
    pub adaptive_bias: i32,
    /// Tile edge length of the local Otsu pass
    pub local_tile_size: u32,
    /// Largest skew angle searched, in degrees either side of zero
    pub deskew_max_angle: f32,
    /// Coarse search step, degrees
    pub deskew_coarse_step: f32,
    /// Refinement step, degrees
    pub deskew_fine_step: f32,
    /// Detected angles smaller than this are not corrected
    pub deskew_min_angle: f32,
    /// Douglas-Peucker tolerance used when reducing the page contour
    pub dewarp_epsilon: f64,
    /// Bias of the mean adaptive threshold that isolates the page outline
    pub dewarp_threshold_bias: i32,
    /// Radius of the open structuring element (square, 2r+1)
    pub open_radius: u32,
    /// Radius of the close structuring element (square, 2r+1)
    pub close_radius: u32,
    /// Median blur radius
    pub median_radius: u32,
    /// Bilateral filter window diameter
    pub bilateral_window: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
    /// Gamma applied after histogram equalization (1.0 leaves the curve unchanged)
    pub contrast_gamma: f32,
    /// Border trim margin as a fraction of the content box size
    pub border_margin_ratio: f32,
    /// Mean adaptive threshold radius of the background removal stage
    pub background_radius: u32,
    pub background_bias: i32,
    /// Disable to force every hybrid stage onto its fallback
    pub primary_enabled: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.5,
            adaptive_block_size: 31,
            adaptive_bias: 10,
            local_tile_size: 200,
            deskew_max_angle: 10.0,
            deskew_coarse_step: 0.5,
            deskew_fine_step: 0.1,
            deskew_min_angle: 0.1,
            dewarp_epsilon: 20.0,
            dewarp_threshold_bias: 10,
            open_radius: 1,
            close_radius: 1,
            median_radius: 1,
            bilateral_window: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            contrast_gamma: 1.0,
            border_margin_ratio: 0.1,
            background_radius: 15,
            background_bias: 15,
            primary_enabled: true,
        }
    }
}

impl PreprocessingConfig {
    /// Load preprocessing configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            scale_factor: env_or("DOCSCAN_SCALE_FACTOR", defaults.scale_factor)?,
            adaptive_block_size: env_or("DOCSCAN_ADAPTIVE_BLOCK_SIZE", defaults.adaptive_block_size)?,
            adaptive_bias: env_or("DOCSCAN_ADAPTIVE_BIAS", defaults.adaptive_bias)?,
            local_tile_size: env_or("DOCSCAN_LOCAL_TILE_SIZE", defaults.local_tile_size)?,
            deskew_max_angle: env_or("DOCSCAN_DESKEW_MAX_ANGLE", defaults.deskew_max_angle)?,
            deskew_coarse_step: env_or("DOCSCAN_DESKEW_COARSE_STEP", defaults.deskew_coarse_step)?,
            deskew_fine_step: env_or("DOCSCAN_DESKEW_FINE_STEP", defaults.deskew_fine_step)?,
            deskew_min_angle: env_or("DOCSCAN_DESKEW_MIN_ANGLE", defaults.deskew_min_angle)?,
            dewarp_epsilon: env_or("DOCSCAN_DEWARP_EPSILON", defaults.dewarp_epsilon)?,
            dewarp_threshold_bias: env_or(
                "DOCSCAN_DEWARP_THRESHOLD_BIAS",
                defaults.dewarp_threshold_bias,
            )?,
            open_radius: env_or("DOCSCAN_OPEN_RADIUS", defaults.open_radius)?,
            close_radius: env_or("DOCSCAN_CLOSE_RADIUS", defaults.close_radius)?,
            median_radius: env_or("DOCSCAN_MEDIAN_RADIUS", defaults.median_radius)?,
            bilateral_window: env_or("DOCSCAN_BILATERAL_WINDOW", defaults.bilateral_window)?,
            bilateral_sigma_color: env_or(
                "DOCSCAN_BILATERAL_SIGMA_COLOR",
                defaults.bilateral_sigma_color,
            )?,
            bilateral_sigma_space: env_or(
                "DOCSCAN_BILATERAL_SIGMA_SPACE",
                defaults.bilateral_sigma_space,
            )?,
            contrast_gamma: env_or("DOCSCAN_CONTRAST_GAMMA", defaults.contrast_gamma)?,
            border_margin_ratio: env_or(
                "DOCSCAN_BORDER_MARGIN_RATIO",
                defaults.border_margin_ratio,
            )?,
            background_radius: env_or("DOCSCAN_BACKGROUND_RADIUS", defaults.background_radius)?,
            background_bias: env_or("DOCSCAN_BACKGROUND_BIAS", defaults.background_bias)?,
            primary_enabled: env::var("DOCSCAN_PRIMARY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                != "false",
        })
    }

    /// Validate preprocessing configuration
    pub fn validate(&self) -> AppResult<()> {
        if !(self.scale_factor > 0.0 && self.scale_factor <= 8.0) {
            return Err(AppError::Config(format!(
                "Scale factor must be in (0, 8], got {}",
                self.scale_factor
            )));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(AppError::Config(format!(
                "Adaptive block size must be odd and at least 3, got {}",
                self.adaptive_block_size
            )));
        }
        if self.local_tile_size < 8 {
            return Err(AppError::Config(format!(
                "Local tile size must be at least 8, got {}",
                self.local_tile_size
            )));
        }
        if !(self.deskew_max_angle > 0.0 && self.deskew_max_angle <= 45.0) {
            return Err(AppError::Config(format!(
                "Deskew search range must be in (0, 45] degrees, got {}",
                self.deskew_max_angle
            )));
        }
        if self.deskew_coarse_step <= 0.0
            || self.deskew_fine_step <= 0.0
            || self.deskew_fine_step > self.deskew_coarse_step
        {
            return Err(AppError::Config(
                "Deskew steps must be positive and the fine step must not exceed the coarse step"
                    .to_string(),
            ));
        }
        if self.deskew_min_angle < 0.0 {
            return Err(AppError::Config(
                "Minimum deskew angle cannot be negative".to_string(),
            ));
        }
        if self.dewarp_epsilon <= 0.0 {
            return Err(AppError::Config(
                "Dewarp polygon epsilon must be positive".to_string(),
            ));
        }
        if self.open_radius > 10 || self.close_radius > 10 || self.median_radius > 10 {
            return Err(AppError::Config(
                "Morphology and median radii must not exceed 10".to_string(),
            ));
        }
        if self.bilateral_window < 1 || self.bilateral_window > 31 {
            return Err(AppError::Config(format!(
                "Bilateral window must be between 1 and 31, got {}",
                self.bilateral_window
            )));
        }
        if self.bilateral_sigma_color <= 0.0 || self.bilateral_sigma_space <= 0.0 {
            return Err(AppError::Config(
                "Bilateral sigmas must be positive".to_string(),
            ));
        }
        if !(self.contrast_gamma > 0.0 && self.contrast_gamma <= 10.0) {
            return Err(AppError::Config(format!(
                "Contrast gamma must be in (0, 10], got {}",
                self.contrast_gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.border_margin_ratio) {
            return Err(AppError::Config(format!(
                "Border margin ratio must be in [0, 1], got {}",
                self.border_margin_ratio
            )));
        }
        if self.background_radius == 0 {
            return Err(AppError::Config(
                "Background removal radius must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Segmentation engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// A row belongs to a line when its ink count exceeds `width / line_density_divisor`
    pub line_density_divisor: u32,
    /// Bands with fewer rows are discarded
    pub min_line_rows: u32,
    /// Word boxes must be strictly larger than this in both dimensions
    pub min_word_size: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            line_density_divisor: 20,
            min_line_rows: 8,
            min_word_size: 5,
        }
    }
}

impl SegmentationConfig {
    /// Load segmentation configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            line_density_divisor: env_or(
                "DOCSCAN_LINE_DENSITY_DIVISOR",
                defaults.line_density_divisor,
            )?,
            min_line_rows: env_or("DOCSCAN_MIN_LINE_ROWS", defaults.min_line_rows)?,
            min_word_size: env_or("DOCSCAN_MIN_WORD_SIZE", defaults.min_word_size)?,
        })
    }

    /// Validate segmentation configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.line_density_divisor == 0 {
            return Err(AppError::Config(
                "Line density divisor must be greater than 0".to_string(),
            ));
        }
        if self.min_line_rows == 0 {
            return Err(AppError::Config(
                "Minimum line rows must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main application configuration combining all sub-configurations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Preprocessing stage parameters
    pub preprocessing: PreprocessingConfig,
    /// Segmentation parameters
    pub segmentation: SegmentationConfig,
    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            preprocessing: PreprocessingConfig::from_env()?,
            segmentation: SegmentationConfig::from_env()?,
            observability: ObservabilityConfig::from_env(),
        })
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.preprocessing.validate()?;
        self.segmentation.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: scale_factor={}, primary_enabled={}, line_density_divisor={}, min_line_rows={}, log_level={}",
            self.preprocessing.scale_factor,
            self.preprocessing.primary_enabled,
            self.segmentation.line_density_divisor,
            self.segmentation.min_line_rows,
            self.observability.log_level
        )
    }
}
