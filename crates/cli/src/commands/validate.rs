//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DriverConfig, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    sensor_id: String,
    frame: String,
    depth_format: String,
    columns: u32,
    rows: u32,
    samples_per_record: usize,
    sampling_time: f64,
    source: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(summarize(&config)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(config: &DriverConfig) -> ConfigSummary {
    let depth = &config.depth;
    let plan = depth_processor::plan(
        depth.frame_width,
        depth.frame_height,
        depth.point_cloud_scale_down_factor,
    );
    ConfigSummary {
        version: format!("{:?}", config.version),
        sensor_id: config.sensor.id.clone(),
        frame: format!("{}x{}", depth.frame_width, depth.frame_height),
        depth_format: depth.depth_format.to_string(),
        columns: plan.columns,
        rows: plan.rows,
        samples_per_record: plan.sample_count,
        sampling_time: depth.sampling_time,
        source: format!("{:?}", config.source.kind),
        sink_count: config.sinks.len(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &DriverConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let depth = &config.depth;
    let factor = depth.point_cloud_scale_down_factor;

    if factor <= 0 {
        warnings.push(format!(
            "depth.point_cloud_scale_down_factor = {factor} is treated as 1 (no decimation)"
        ));
    }

    let stride = depth_processor::normalize_factor(factor) as i32;
    if depth.frame_width % stride != 0 || depth.frame_height % stride != 0 {
        warnings.push(format!(
            "{}x{} is not divisible by scale down factor {stride} - trailing columns/rows are skipped",
            depth.frame_width, depth.frame_height
        ));
    }

    let plan = depth_processor::plan(depth.frame_width, depth.frame_height, factor);
    if plan.sample_count == 0 {
        warnings.push(format!(
            "scale down factor {stride} is larger than the frame - records will carry no samples"
        ));
    }

    if depth.sampling_time == 0.0 {
        warnings.push(
            "depth.sampling_time is 0 - every frame with a newer timestamp is published".to_string(),
        );
    }

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - published records will be dropped".to_string());
    }

    for sink in &config.sinks {
        if sink.sink_type == SinkType::File && !sink.params.contains_key("base_path") {
            warnings.push(format!(
                "Sink '{}' has no base_path - writing to ./output",
                sink.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Sensor: {}", summary.sensor_id);
            println!("  Frame: {} {}", summary.frame, summary.depth_format);
            println!(
                "  Grid: {}x{} ({} samples per record)",
                summary.columns, summary.rows, summary.samples_per_record
            );
            println!("  Sampling time: {}s", summary.sampling_time);
            println!("  Source: {}", summary.source);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
