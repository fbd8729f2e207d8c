//! # Strategy Stages
//!
//! A strategy stage wraps one normalization step implemented twice: a primary
//! algorithm and an independent fallback. Applying a stage never fails:
//!
//! 1. An empty input is returned as an empty output without running anything.
//! 2. The primary runs if its probe succeeded when the stage was built.
//! 3. If the primary is unavailable, errors, or produces an empty image, the fallback
//!    runs for this call only. The cached availability flag is never revisited.
//! 4. If the fallback also fails, the input is passed through unchanged.
//!
//! Every call records its outcome in the thread-local diagnostics, the `metrics`
//! facade and the `docscan_preprocessing` tracing target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use image::GrayImage;

use super::types::{PreprocessingError, StageKind, StageOutcome, StageResult, StrategyPath};
use crate::diagnostics;
use crate::errors::error_logging;
use crate::observability;
use crate::raster::Image;

/// One algorithm able to perform a stage on a single-channel raster.
pub trait Strategy: Send + Sync {
    /// Stable identifier used in logs, metrics and stage outcomes.
    fn name(&self) -> &'static str;

    /// Reports whether the strategy can run at all. Called once per stage construction.
    fn probe(&self) -> Result<(), PreprocessingError> {
        Ok(())
    }

    /// Produces a new image; the input is never modified.
    fn apply(&self, image: &GrayImage) -> Result<GrayImage, PreprocessingError>;
}

/// A normalization step with a primary strategy and an optional fallback.
pub struct StrategyStage {
    kind: StageKind,
    primary: Box<dyn Strategy>,
    fallback: Option<Box<dyn Strategy>>,
    primary_available: bool,
    fallback_count: AtomicU64,
}

impl std::fmt::Debug for StrategyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyStage")
            .field("kind", &self.kind)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|s| s.name()))
            .field("primary_available", &self.primary_available)
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

impl StrategyStage {
    /// Builds a hybrid stage, probing the primary once.
    pub fn new(kind: StageKind, primary: Box<dyn Strategy>, fallback: Box<dyn Strategy>) -> Self {
        Self::build(kind, primary, Some(fallback))
    }

    /// Builds a stage with no fallback; a failure passes the input through.
    pub fn single(kind: StageKind, strategy: Box<dyn Strategy>) -> Self {
        Self::build(kind, strategy, None)
    }

    fn build(
        kind: StageKind,
        primary: Box<dyn Strategy>,
        fallback: Option<Box<dyn Strategy>>,
    ) -> Self {
        let primary_available = match primary.probe() {
            Ok(()) => true,
            Err(e) => {
                tracing::info!(
                    stage = %kind,
                    strategy = primary.name(),
                    reason = %e,
                    "Primary strategy unavailable, stage will use its fallback"
                );
                false
            }
        };

        Self {
            kind,
            primary,
            fallback,
            primary_available,
            fallback_count: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Result of the construction-time probe.
    pub fn is_primary_available(&self) -> bool {
        self.primary_available
    }

    /// Number of calls that ran the fallback instead of keeping a primary result.
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    pub fn fallback_name(&self) -> Option<&'static str> {
        self.fallback.as_ref().map(|s| s.name())
    }

    /// Runs the stage on `image`. Never fails; see the module docs for the order of attempts.
    pub fn apply(&self, image: &Image) -> StageResult {
        let start_time = Instant::now();

        if image.is_empty() {
            return self.finish(Image::empty(), "none", StrategyPath::Skipped, None, start_time);
        }

        let gray = match image.to_gray_image() {
            Ok(gray) => gray,
            Err(e) => {
                let note = e.to_string();
                error_logging::log_stage_identity(&e, self.kind.as_str(), image.dimensions());
                diagnostics::record_error(format!("{}: {}", self.kind, note));
                return self.finish(
                    image.clone(),
                    "identity",
                    StrategyPath::Identity,
                    Some(note),
                    start_time,
                );
            }
        };

        let mut notes: Vec<String> = Vec::new();

        if self.primary_available {
            match run_strategy(self.primary.as_ref(), &gray) {
                Ok(output) => {
                    return self.finish(
                        Image::from_gray(output),
                        self.primary.name(),
                        StrategyPath::Primary,
                        None,
                        start_time,
                    );
                }
                Err(e) => {
                    error_logging::log_stage_fallback(
                        &e,
                        self.kind.as_str(),
                        self.primary.name(),
                        self.fallback_name(),
                    );
                    notes.push(format!("{}: {}", self.primary.name(), e));
                }
            }
        } else {
            notes.push(format!("{}: unavailable", self.primary.name()));
        }

        if let Some(fallback) = &self.fallback {
            self.fallback_count.fetch_add(1, Ordering::Relaxed);
            match run_strategy(fallback.as_ref(), &gray) {
                Ok(output) => {
                    return self.finish(
                        Image::from_gray(output),
                        fallback.name(),
                        StrategyPath::Fallback,
                        Some(notes.join("; ")),
                        start_time,
                    );
                }
                Err(e) => notes.push(format!("{}: {}", fallback.name(), e)),
            }
        }

        let note = notes.join("; ");
        error_logging::log_stage_identity(&note, self.kind.as_str(), image.dimensions());
        diagnostics::record_error(format!("{}: {}", self.kind, note));
        self.finish(
            image.clone(),
            "identity",
            StrategyPath::Identity,
            Some(note),
            start_time,
        )
    }

    fn finish(
        &self,
        image: Image,
        strategy: &'static str,
        path: StrategyPath,
        note: Option<String>,
        start_time: Instant,
    ) -> StageResult {
        let outcome = StageOutcome {
            stage: self.kind,
            strategy,
            path,
            elapsed: start_time.elapsed(),
            note,
        };

        tracing::debug!(
            target: "docscan_preprocessing",
            "Stage {} completed in {:.2}ms via {} ({}): dimensions={}x{}",
            self.kind,
            outcome.elapsed.as_secs_f64() * 1000.0,
            strategy,
            path,
            image.width(),
            image.height()
        );
        diagnostics::record_timing(outcome.timing_line());
        observability::record_stage_metrics(self.kind, path, outcome.elapsed);

        StageResult { image, outcome }
    }
}

/// Runs one strategy, treating an empty output as a failure.
fn run_strategy(strategy: &dyn Strategy, gray: &GrayImage) -> Result<GrayImage, PreprocessingError> {
    let output = strategy.apply(gray)?;
    if output.width() == 0 || output.height() == 0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: "strategy produced an empty image".to_string(),
        });
    }
    Ok(output)
}
