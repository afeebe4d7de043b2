//! `convoy-kernel` – convoy supervision.
//!
//! # Modules
//!
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: tracks heartbeats per
//!   vehicle id and reports, once per outage, vehicles that went silent so the
//!   monitor can flag a broken convoy link.

pub mod watchdog;

pub use watchdog::{HeartbeatLapse, LivenessChange, VehicleHealth, Watchdog};
