//! # Tesseract Recognition Engine
//!
//! [`RecognitionEngine`] backed by Tesseract through `leptess`. Only built with the
//! `tesseract` cargo feature, which needs libtesseract and libleptonica at link time.

use std::io::Cursor;

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::ocr::{RecognitionEngine, RecognitionResult};
use crate::ocr_errors::OcrError;

/// Tesseract engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Language codes joined by `+`, e.g. `eng+fra`
    pub languages: String,
    /// Page segmentation mode; 7 treats each region as a single text line
    pub psm_mode: u32,
    /// Tessdata directory; `None` uses the Tesseract default
    pub tessdata_path: Option<String>,
    /// Restricts recognition to these characters
    pub character_whitelist: Option<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            psm_mode: 7,
            tessdata_path: None,
            character_whitelist: None,
        }
    }
}

impl RecognitionConfig {
    /// Load recognition configuration from `DOCSCAN_OCR_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            languages: std::env::var("DOCSCAN_OCR_LANGUAGES").unwrap_or(defaults.languages),
            psm_mode: std::env::var("DOCSCAN_OCR_PSM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.psm_mode),
            tessdata_path: std::env::var("DOCSCAN_TESSDATA_PATH").ok(),
            character_whitelist: std::env::var("DOCSCAN_OCR_WHITELIST").ok(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config(
                "OCR languages cannot be empty".to_string(),
            ));
        }
        if self.psm_mode > 13 {
            return Err(AppError::Config(format!(
                "PSM mode must be between 0 and 13, got {}",
                self.psm_mode
            )));
        }
        Ok(())
    }

    /// Registry key identifying engines built from this configuration.
    pub fn instance_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.languages,
            self.psm_mode,
            self.tessdata_path.as_deref().unwrap_or("default")
        )
    }
}

/// A single Tesseract instance. Not shareable across threads without a lock.
pub struct TesseractEngine {
    tess: LepTess,
}

impl TesseractEngine {
    /// Initializes Tesseract with the configured languages and variables.
    ///
    /// # Errors
    ///
    /// Returns `OcrError::Initialization` if the language data cannot be loaded or a
    /// variable is rejected.
    pub fn new(config: &RecognitionConfig) -> Result<Self, OcrError> {
        info!(
            "Initializing Tesseract for languages: {} (psm {})",
            config.languages, config.psm_mode
        );
        let mut tess = LepTess::new(config.tessdata_path.as_deref(), &config.languages)
            .map_err(|e| OcrError::Initialization(format!("Failed to initialize Tesseract: {}", e)))?;

        tess.set_variable(Variable::TesseditPagesegMode, &config.psm_mode.to_string())
            .map_err(|e| OcrError::Initialization(format!("Failed to set PSM mode: {}", e)))?;

        if let Some(whitelist) = &config.character_whitelist {
            tess.set_variable(Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| {
                    OcrError::Initialization(format!("Failed to set character whitelist: {}", e))
                })?;
        }

        Ok(Self { tess })
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&mut self, region: &GrayImage) -> Result<RecognitionResult, OcrError> {
        let mut encoded = Cursor::new(Vec::new());
        region
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|e| OcrError::ImageLoad(format!("Failed to encode region: {}", e)))?;

        self.tess
            .set_image_from_mem(encoded.get_ref())
            .map_err(|e| OcrError::ImageLoad(format!("Failed to load region for OCR: {}", e)))?;

        let text = self
            .tess
            .get_utf8_text()
            .map_err(|e| OcrError::Extraction(format!("Failed to extract text: {}", e)))?;
        // Tesseract reports 0-100
        let confidence = self.tess.mean_text_conf() as f32 / 100.0;

        debug!(
            chars = text.len(),
            confidence = confidence,
            "Recognized {}x{} region",
            region.width(),
            region.height()
        );
        Ok(RecognitionResult::new(text.trim(), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RecognitionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instance_key(), "eng:7:default");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RecognitionConfig {
            languages: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecognitionConfig {
            psm_mode: 14,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
