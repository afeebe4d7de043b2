//! `convoy-runtime` – the vehicle side of the convoy.
//!
//! # Modules
//!
//! - [`vehicle`] – [`VehicleNode`]: the per-vehicle state machine that turns
//!   motion readings, timer ticks and bus messages into brake-light changes
//!   and published `MODE` / `WARNING` / `HEARTBEAT` / `STATUS` messages.
//! - [`driver`] – [`VehicleDriver`]: the tokio tasks (heartbeat interval,
//!   motion poll, blocking LCM receive loop) that run a shared node.
//! - [`event_log`] – [`EventLog`]: the bounded, timestamped log behind the
//!   vehicle console's `l` command.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber setup shared by both binaries.

pub mod driver;
pub mod event_log;
pub mod telemetry;
pub mod vehicle;

pub use driver::{DriverConfig, SharedNode, VehicleDriver};
pub use event_log::EventLog;
pub use telemetry::init_tracing;
pub use vehicle::VehicleNode;
