//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DataComponent, DataEncoding, DriverConfig, RecordDescriptor};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    sensor: SensorInfo,
    depth: DepthInfo,
    source: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    descriptor: RecordDescriptor,
    encoding: DataEncoding,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    device_index: u32,
}

#[derive(Serialize)]
struct DepthInfo {
    frame_width: i32,
    frame_height: i32,
    depth_format: String,
    stride: u32,
    columns: u32,
    rows: u32,
    sampling_time: f64,
    emit_validity_mask: bool,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info, args)?;
    }

    Ok(())
}

fn build_config_info(config: &DriverConfig, args: &InfoArgs) -> ConfigInfo {
    let depth = &config.depth;
    let plan = depth_processor::plan(
        depth.frame_width,
        depth.frame_height,
        depth.point_cloud_scale_down_factor,
    );

    let sinks = if args.sinks || args.json {
        config
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        sensor: SensorInfo {
            id: config.sensor.id.clone(),
            device_index: config.sensor.device_index,
        },
        depth: DepthInfo {
            frame_width: depth.frame_width,
            frame_height: depth.frame_height,
            depth_format: depth.depth_format.to_string(),
            stride: plan.stride,
            columns: plan.columns,
            rows: plan.rows,
            sampling_time: depth.sampling_time,
            emit_validity_mask: depth.emit_validity_mask,
        },
        source: format!("{:?}", config.source.kind),
        sinks,
        descriptor: RecordDescriptor::depth_point_cloud(plan.sample_count),
        encoding: DataEncoding::default(),
    }
}

fn print_config_info(info: &ConfigInfo, args: &InfoArgs) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Kinect Depth Driver Configuration              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📷 Sensor");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Id: {}", info.sensor.id);
    println!("   ├─ Device index: {}", info.sensor.device_index);
    println!("   └─ Source: {}", info.source);

    let depth = &info.depth;
    println!("\n🌊 Depth");
    println!(
        "   ├─ Frame: {}x{} {}",
        depth.frame_width, depth.frame_height, depth.depth_format
    );
    println!(
        "   ├─ Grid: {}x{} (stride {})",
        depth.columns, depth.rows, depth.stride
    );
    println!("   ├─ Sampling time: {}s", depth.sampling_time);
    println!("   └─ Validity mask: {}", depth.emit_validity_mask);

    let descriptor = &info.descriptor;
    println!("\n🧾 Record: {}", descriptor.name);
    for (i, field) in descriptor.fields.iter().enumerate() {
        let prefix = if i == descriptor.fields.len() - 1 { "└─" } else { "├─" };
        match &field.component {
            DataComponent::Time { uom, .. } => println!("   {prefix} {}: time ({uom})", field.name),
            DataComponent::Array {
                element_count,
                element,
            } => println!(
                "   {prefix} {}: {element_count} x {} [{}]",
                field.name, element.label, element.uom
            ),
        }
    }
    if args.descriptor {
        let json = serde_json::to_string_pretty(descriptor)
            .context("Failed to serialize record descriptor")?;
        println!("\n{json}");
    }

    if !info.sinks.is_empty() {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
    Ok(())
}
