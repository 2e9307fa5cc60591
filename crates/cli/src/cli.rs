//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kinect Depth - point cloud driver for Kinect depth sensors
#[derive(Parser, Debug)]
#[command(
    name = "kinect-depth",
    author,
    version,
    about = "Kinect depth point cloud driver",
    long_about = "Turns raw Kinect depth frames into decimated, calibrated point cloud records.\n\n\
                  Opens a frame source (mock or recorded replay), rate-limits and decimates \n\
                  depth frames, and dispatches the resulting records to configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "KINECT_DEPTH_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "KINECT_DEPTH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the depth driver
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information and the record descriptor
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "KINECT_DEPTH_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the sensor id stamped on published records
    #[arg(long, env = "KINECT_DEPTH_SENSOR_ID")]
    pub sensor_id: Option<String>,

    /// Override depth.sampling_time (seconds)
    #[arg(long, env = "KINECT_DEPTH_SAMPLING_TIME")]
    pub sampling_time: Option<f64>,

    /// Override depth.point_cloud_scale_down_factor
    #[arg(long, env = "KINECT_DEPTH_SCALE_DOWN")]
    pub scale_down: Option<i32>,

    /// Replay a recording directory instead of the configured source
    #[arg(long, env = "KINECT_DEPTH_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Maximum number of records to publish (0 = unlimited)
    #[arg(long, default_value = "0", env = "KINECT_DEPTH_MAX_RECORDS")]
    pub max_records: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "KINECT_DEPTH_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between the processor and the dispatcher
    #[arg(long, default_value = "100", env = "KINECT_DEPTH_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "KINECT_DEPTH_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the full record descriptor
    #[arg(long)]
    pub descriptor: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "kinect-depth",
            "-v",
            "run",
            "--config",
            "driver.toml",
            "--sampling-time",
            "0.5",
            "--max-records",
            "10",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("driver.toml"));
                assert_eq!(args.sampling_time, Some(0.5));
                assert_eq!(args.max_records, 10);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["kinect-depth", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }
}
