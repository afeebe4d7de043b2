//! `convoy-cli` – the convoy command-line tools.
//!
//! Two binaries share this library:
//!
//! - `convoy-monitor` – subscribes to the convoy channels and pretty-prints
//!   every message it receives.
//! - `convoy-vehicle` – runs one simulated vehicle with an interactive console.
//!
//! # Modules
//!
//! - [`args`] – clap definitions and flag/config merging.
//! - [`config`] – `~/.convoy/config.toml` with `CONVOY_*` overrides.
//! - [`format`] – pure message formatters.
//! - [`monitor`] – subscriptions, printer and liveness reporting.
//! - [`repl`] – the vehicle console.

pub mod args;
pub mod config;
pub mod format;
pub mod monitor;
pub mod repl;
