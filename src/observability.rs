//! Observability helpers: tracing subscriber setup, spans and metric recording.
//!
//! The library only emits through the `tracing` and `metrics` facades. Installing a
//! metrics exporter is left to the host application.

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};
use crate::preprocessing::{PipelineMode, StageKind, StrategyPath};

/// Initialize structured logging with tracing and configuration.
///
/// Calling this more than once is harmless: a second global subscriber is
/// rejected and the error is ignored.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("docscan={}", config.log_level).parse()?)
        .add_directive(format!("docscan_preprocessing={}", config.log_level).parse()?);

    let installed = match config.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(
            environment = %config.environment,
            log_level = %config.log_level,
            "Tracing initialized with structured logging"
        );
    }
    Ok(())
}

/// Create a span for a pipeline run
pub fn pipeline_span(mode: PipelineMode) -> tracing::Span {
    tracing::info_span!(
        "preprocess_pipeline",
        mode = mode.as_str(),
        component = "preprocessing"
    )
}

/// Create a span for segmentation operations
pub fn segmentation_span(operation: &str, images: usize) -> tracing::Span {
    tracing::info_span!(
        "segmentation_operation",
        operation = operation,
        images = images,
        component = "segmentation"
    )
}

/// Create a span for recognition operations
pub fn ocr_span(operation: &str, regions: usize) -> tracing::Span {
    tracing::info_span!(
        "ocr_operation",
        operation = operation,
        regions = regions,
        component = "ocr"
    )
}

/// Record one strategy stage invocation
pub fn record_stage_metrics(stage: StageKind, path: StrategyPath, duration: Duration) {
    metrics::counter!(
        "docscan_stage_runs_total",
        "stage" => stage.as_str(),
        "path" => path.as_str()
    )
    .increment(1);
    metrics::histogram!("docscan_stage_duration_seconds", "stage" => stage.as_str())
        .record(duration.as_secs_f64());
}

/// Record a pipeline run outcome
pub fn record_pipeline_metrics(mode: PipelineMode, success: bool, duration: Duration) {
    metrics::counter!(
        "docscan_pipeline_runs_total",
        "mode" => mode.as_str(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("docscan_pipeline_duration_seconds", "mode" => mode.as_str())
        .record(duration.as_secs_f64());
}

/// Record how many regions a segmentation call produced
pub fn record_segmentation_metrics(operation: &'static str, regions: usize) {
    metrics::histogram!("docscan_segmentation_regions", "operation" => operation)
        .record(regions as f64);
}

/// Record recognition batch metrics
pub fn record_ocr_metrics(regions: usize, failures: usize, duration: Duration) {
    metrics::counter!("docscan_ocr_regions_total", "result" => "success")
        .increment(regions.saturating_sub(failures) as u64);
    metrics::counter!("docscan_ocr_regions_total", "result" => "failure")
        .increment(failures as u64);
    metrics::histogram!("docscan_ocr_batch_duration_seconds").record(duration.as_secs_f64());
}
