//! Command-line arguments of both binaries.

use std::time::Duration;

use clap::Parser;

use crate::config::Config;

const MONITOR_AFTER_HELP: &str = "\
Channels:
  HEARTBEAT      Vehicle heartbeat messages
  WARNING        Danger/obstacle warning messages
  MODE           Driving mode change messages
  STATUS         Vehicle status messages

Press Ctrl+C to stop";

/// Print convoy messages from the LCM bus as they arrive.
#[derive(Debug, Clone, Parser)]
#[command(name = "convoy-monitor", version, after_help = MONITOR_AFTER_HELP)]
pub struct MonitorArgs {
    /// Subscribe to a single channel (default: all).
    #[arg(short, long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// LCM provider URL, e.g. udpm://239.255.76.67:7667?ttl=0 or memq://.
    #[arg(long)]
    pub url: Option<String>,

    /// Receive loop timeout in milliseconds [default: 100].
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print one JSON object per message instead of text.
    #[arg(long)]
    pub json: bool,

    /// Report vehicles silent for this long; 0 disables [default: 3000].
    #[arg(long, value_name = "MS")]
    pub heartbeat_timeout_ms: Option<u64>,

    /// Disable coloured output.
    #[arg(long)]
    pub no_color: bool,

    /// Write the effective settings to ~/.convoy/config.toml and exit.
    #[arg(long)]
    pub save_config: bool,
}

/// Settings the monitor runs with after config, environment and flags are
/// merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub channel: Option<String>,
    pub url: String,
    pub poll_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub json: bool,
    pub color: bool,
}

impl MonitorArgs {
    /// Layer the flags over `cfg`.
    pub fn resolve(&self, cfg: &Config) -> MonitorSettings {
        MonitorSettings {
            channel: self.channel.clone(),
            url: self.url.clone().unwrap_or_else(|| cfg.lcm_url.clone()),
            poll_timeout: Duration::from_millis(self.timeout_ms.unwrap_or(cfg.poll_timeout_ms)),
            heartbeat_timeout: Duration::from_millis(
                self.heartbeat_timeout_ms.unwrap_or(cfg.heartbeat_timeout_ms),
            ),
            json: self.json,
            color: cfg.color && !self.no_color,
        }
    }

    /// The config file contents that would reproduce these flags.
    pub fn to_config(&self, cfg: &Config) -> Config {
        Config {
            lcm_url: self.url.clone().unwrap_or_else(|| cfg.lcm_url.clone()),
            poll_timeout_ms: self.timeout_ms.unwrap_or(cfg.poll_timeout_ms),
            heartbeat_timeout_ms: self.heartbeat_timeout_ms.unwrap_or(cfg.heartbeat_timeout_ms),
            vehicle_id: cfg.vehicle_id,
            color: cfg.color && !self.no_color,
        }
    }
}

/// Run one simulated convoy vehicle with an interactive console.
#[derive(Debug, Clone, Parser)]
#[command(name = "convoy-vehicle", version)]
pub struct VehicleArgs {
    /// Unique vehicle identifier [default: 1].
    #[arg(long, value_name = "ID")]
    pub vehicle_id: Option<i32>,

    /// Initial driving mode: 0 single, 1 head of convoy, 2 in convoy.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=2))]
    pub mode: i32,

    /// LCM provider URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Motion sensor poll period in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 33)]
    pub motion_period_ms: u64,

    /// Disable coloured output.
    #[arg(long)]
    pub no_color: bool,
}
