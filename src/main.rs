use anyhow::Result;
use docscan::config::AppConfig;
use docscan::preprocessing::{PipelineMode, Preprocessor};
use docscan::segmentation::Segmenter;
use docscan::{observability, Image};
use serde_json::json;
use std::env;
use tracing::{error, info};

/// Normalizes and segments each image path given on the command line, printing one
/// JSON summary per image.
fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    observability::init_tracing(&config.observability)?;
    info!("{}", config.summary());

    let mode: PipelineMode = env::var("DOCSCAN_PIPELINE_MODE")
        .ok()
        .map(|raw| raw.parse::<PipelineMode>())
        .transpose()?
        .unwrap_or_default();

    let preprocessor = Preprocessor::new(config.preprocessing.clone())?;
    let segmenter = Segmenter::new(config.segmentation.clone());
    info!(
        mode = mode.as_str(),
        primary_available = preprocessor.primary_available(),
        "Preprocessor ready"
    );

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        return Err(anyhow::anyhow!("usage: docscan <image>..."));
    }

    let mut failures = 0usize;
    for path in &paths {
        let report = match preprocessor.preprocess_path(path, mode) {
            Ok(report) => report,
            Err(e) => {
                error!(path = %path, error = %e, "Could not preprocess image");
                failures += 1;
                continue;
            }
        };

        let stages: Vec<_> = report
            .stages
            .iter()
            .map(|s| {
                json!({
                    "stage": s.stage,
                    "path": s.path,
                    "strategy": s.strategy,
                    "ms": s.elapsed.as_secs_f64() * 1000.0,
                    "note": s.note,
                })
            })
            .collect();
        let timing = report.timing_summary();
        let image: Image = report.into_image();
        let lines = segmenter.segment_lines(&image);

        let summary = json!({
            "path": path,
            "width": image.width(),
            "height": image.height(),
            "timing": timing,
            "stages": stages,
            "lines": lines.as_ref().ok(),
            "segmentation_error": lines.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if failures > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} images could not be processed",
            failures,
            paths.len()
        ));
    }
    Ok(())
}
