//! Clap derive structures for the `shelly-exporter` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// shelly-exporter -- Prometheus metrics for Shelly Gen2+ devices
#[derive(Debug, Parser)]
#[command(
    name = "shelly-exporter",
    version,
    about = "Export Shelly device metrics to Prometheus",
    long_about = "Polls Shelly Gen2+ devices over their RPC-over-HTTP interface and\n\
        serves their state as Prometheus metrics.\n\n\
        Devices are listed in the config file or passed with --device.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the TOML config file
    #[arg(long, short = 'c', env = "SHELLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Address the metrics endpoint listens on (overrides config)
    #[arg(long, short = 'l', global = true)]
    pub listen: Option<SocketAddr>,

    /// Seconds between refreshes of each device (overrides config)
    #[arg(long, short = 'i', value_name = "SECONDS", global = true)]
    pub interval: Option<u64>,

    /// Per-request timeout in seconds (overrides config)
    #[arg(long, short = 't', value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Monitor an additional device; repeatable
    #[arg(long = "device", short = 'd', value_name = "HOST", global = true)]
    pub devices: Vec<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(
        long,
        env = "SHELLY_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Start polling devices and serving metrics
    Run,

    /// Validate and print the resolved configuration, then exit
    CheckConfig,
}
