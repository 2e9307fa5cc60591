//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{DriverConfig, SourceKind};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args);
    config_loader::ConfigLoader::validate(&config)
        .context("Configuration invalid after CLI overrides")?;

    info!(
        sensor_id = %config.sensor.id,
        width = config.depth.frame_width,
        height = config.depth.frame_height,
        scale_down = config.depth.point_cloud_scale_down_factor,
        sampling_time = config.depth.sampling_time,
        source = ?config.source.kind,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        driver: config,
        max_records: (args.max_records > 0).then_some(args.max_records),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");
    let stats = pipeline
        .run_until(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        records = stats.records_received,
        stop_reason = ?stats.stop_reason,
        duration_secs = stats.duration.as_secs_f64(),
        rate = format!("{:.2}", stats.records_per_sec()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Kinect depth driver finished");
    Ok(())
}

/// Apply CLI flag / env overrides on top of the file configuration
fn apply_overrides(config: &mut DriverConfig, args: &RunArgs) {
    if let Some(ref id) = args.sensor_id {
        info!(sensor_id = %id, "Overriding sensor id from CLI");
        config.sensor.id = id.clone();
    }
    if let Some(sampling_time) = args.sampling_time {
        info!(sampling_time, "Overriding sampling time from CLI");
        config.depth.sampling_time = sampling_time;
    }
    if let Some(factor) = args.scale_down {
        info!(factor, "Overriding scale down factor from CLI");
        config.depth.point_cloud_scale_down_factor = factor;
    }
    if let Some(ref path) = args.replay {
        info!(path = %path.display(), "Replaying recording from CLI");
        config.source.kind = SourceKind::Replay;
        config.source.replay_path = Some(path.clone());
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &DriverConfig) {
    let depth = &config.depth;
    println!("\n=== Configuration Summary ===\n");
    println!("Sensor: {} (device {})", config.sensor.id, config.sensor.device_index);
    println!("\nDepth:");
    println!("  Frame: {}x{} {}", depth.frame_width, depth.frame_height, depth.depth_format);
    println!("  Scale down factor: {}", depth.point_cloud_scale_down_factor);
    println!("  Sampling time: {}s", depth.sampling_time);
    println!("  Validity mask: {}", depth.emit_validity_mask);

    println!("\nSource: {:?}", config.source.kind);
    match config.source.kind {
        SourceKind::Mock => {
            println!("  Frame rate: {} Hz", config.source.frame_rate_hz);
            println!("  Pattern: {:?}", config.source.pattern);
        }
        SourceKind::Replay => {
            if let Some(ref path) = config.source.replay_path {
                println!("  Recording: {}", path.display());
            }
            println!("  Speed: {}x, loop: {}", config.source.replay_speed, config.source.loop_playback);
        }
    }

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
