//! `convoy-monitor` – LCM message monitor for the convoy.
//!
//! Subscribes to `HEARTBEAT`, `WARNING`, `MODE` and `STATUS` (or a single
//! channel with `-c`) and prints every message as it arrives until Ctrl-C or
//! SIGTERM. Vehicles that stop sending heartbeats are flagged.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use tracing::{error, warn};

use convoy_cli::args::MonitorArgs;
use convoy_cli::config;
use convoy_cli::monitor::{Monitor, OutputFormat, Printer, Selection};
use convoy_middleware::Lcm;

fn main() -> ExitCode {
    let args = MonitorArgs::parse();

    // ── Structured logging ────────────────────────────────────────────────
    // Diagnostics go to stderr; messages are printed on stdout.
    convoy_runtime::telemetry::init_tracing("warn");

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = config::load().unwrap_or_else(|e| {
        eprintln!("{}: {e}", "Config error".red());
        eprintln!("  Using default configuration.");
        let mut cfg = config::Config::default();
        config::apply_env_overrides(&mut cfg);
        cfg
    });
    if args.save_config {
        return match config::save(&args.to_config(&cfg)) {
            Ok(path) => {
                println!("Config saved to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "Error saving config".red());
                ExitCode::FAILURE
            }
        };
    }
    let settings = args.resolve(&cfg);
    if !settings.color {
        colored::control::set_override(false);
    }

    // ── Transport ─────────────────────────────────────────────────────────
    let lcm = match Lcm::new(&settings.url) {
        Ok(lcm) => lcm,
        Err(e) => {
            error!(error = %e, url = %settings.url, "LCM initialisation failed");
            eprintln!("Error: Failed to initialize LCM");
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C / SIGTERM ──────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("Received signal, shutting down...");
        running_clone.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!("{}", "LCM Message Monitor Started".bold());
    println!("========================");

    // ── Subscriptions ─────────────────────────────────────────────────────
    let selection = Selection::from_arg(settings.channel.as_deref());
    match &selection {
        Selection::All => println!("Subscribing to all convoy channels..."),
        Selection::One(channel) => println!("Subscribing to channel: {channel}"),
        Selection::Unknown(channel) => {
            println!("Subscribing to channel: {channel}");
            eprintln!("{}", format!("Warning: Unknown channel '{channel}'").yellow());
        }
    }
    let format = if settings.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut monitor = match Monitor::new(
        lcm,
        &selection,
        Printer::stdout(format),
        settings.poll_timeout,
        settings.heartbeat_timeout,
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Waiting for messages... (Press Ctrl+C to stop)");
    println!();

    // ── Receive loop ──────────────────────────────────────────────────────
    let status = match monitor.run(&running) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "receive loop failed");
            eprintln!("Error: LCM handle failed");
            ExitCode::FAILURE
        }
    };

    println!("Cleaning up...");
    drop(monitor);
    println!("LCM Message Monitor stopped.");
    status
}
