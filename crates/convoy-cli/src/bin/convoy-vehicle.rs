//! `convoy-vehicle` – one simulated convoy vehicle.
//!
//! Publishes heartbeats, mode changes, warnings and status on the LCM bus,
//! reacts to warnings and mode changes from other vehicles, and drives
//! simulated brake lights. Motion is toggled from the console with `m`.

use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::error;

use convoy_cli::args::VehicleArgs;
use convoy_cli::config;
use convoy_cli::repl::{self, Console};
use convoy_hal::{BrakeLights, ManualMotionSensor};
use convoy_middleware::Lcm;
use convoy_runtime::driver::lock;
use convoy_runtime::{DriverConfig, SharedNode, VehicleDriver, VehicleNode};

#[tokio::main]
async fn main() -> ExitCode {
    let args = VehicleArgs::parse();

    // ── Structured logging ────────────────────────────────────────────────
    convoy_runtime::telemetry::init_tracing("warn");

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = config::load().unwrap_or_else(|e| {
        eprintln!("{}: {e}", "Config error".red());
        eprintln!("  Using default configuration.");
        let mut cfg = config::Config::default();
        config::apply_env_overrides(&mut cfg);
        cfg
    });
    if args.no_color || !cfg.color {
        colored::control::set_override(false);
    }
    let vehicle_id = args.vehicle_id.unwrap_or(cfg.vehicle_id);
    let url = args.url.clone().unwrap_or_else(|| cfg.lcm_url.clone());

    // ── Transport ─────────────────────────────────────────────────────────
    let lcm = match Lcm::new(&url) {
        Ok(lcm) => lcm,
        Err(e) => {
            error!(error = %e, url = %url, "LCM initialisation failed");
            eprintln!("Error: Failed to initialize LCM");
            return ExitCode::FAILURE;
        }
    };

    let node: SharedNode = Arc::new(Mutex::new(VehicleNode::new(
        vehicle_id,
        lcm.publisher(),
        Box::new(BrakeLights::new()),
    )));
    match lock(&node).set_driving_mode(args.mode) {
        Ok(mode) => println!("Driving mode set to: {} ({})", mode.as_raw(), mode.name()),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    }

    // ── Vehicle tasks ─────────────────────────────────────────────────────
    let motion = ManualMotionSensor::new();
    let driver_config = DriverConfig {
        motion_period: Duration::from_millis(args.motion_period_ms.max(1)),
        poll_timeout: Duration::from_millis(cfg.poll_timeout_ms.max(1)),
        ..DriverConfig::default()
    };
    let driver = match VehicleDriver::spawn(
        node.clone(),
        lcm,
        Box::new(motion.clone()),
        driver_config,
    ) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bus = if url.is_empty() { "the default bus" } else { url.as_str() };
    println!("{}", format!("Vehicle {vehicle_id} started on {bus}").bold());
    repl::print_help();

    // ── Console ───────────────────────────────────────────────────────────
    let console = Console::new(node, motion);
    console
        .run(repl::stdin_lines(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    driver.shutdown().await;
    println!("Vehicle {vehicle_id} stopped.");
    ExitCode::SUCCESS
}
