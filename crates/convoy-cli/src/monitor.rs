//! The message monitor: subscriptions, printing and heartbeat liveness.
//!
//! [`Monitor`] owns the [`Lcm`] handle. Each subscribed channel gets a typed
//! callback that renders the message (text or JSON) through a shared
//! [`Printer`]. Heartbeats also feed a [`Watchdog`], which is polled after
//! every receive iteration so silent vehicles are reported even when the bus
//! is quiet.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Local;
use colored::{ColoredString, Colorize};
use convoy_kernel::{HeartbeatLapse, LivenessChange, Watchdog};
use convoy_middleware::{HandleOutcome, Lcm, ReceiveBuffer, now_utime};
use convoy_types::{
    ALL_CHANNELS, HEARTBEAT_CHANNEL, Heartbeat, MODE_CHANNEL, ModeChange, Result,
    STATUS_CHANNEL, Status, WARNING_CHANNEL, Warning,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::format::{format_heartbeat, format_mode, format_status, format_timestamp, format_warning};

// ─────────────────────────────────────────────────────────────────────────────
// Channel selection
// ─────────────────────────────────────────────────────────────────────────────

/// Which channels the monitor subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    One(&'static str),
    /// A channel name the monitor has no decoder for. Nothing is subscribed.
    Unknown(String),
}

impl Selection {
    /// `None` selects every convoy channel. Names are matched exactly.
    pub fn from_arg(channel: Option<&str>) -> Self {
        match channel {
            None => Selection::All,
            Some(name) => ALL_CHANNELS
                .iter()
                .find(|c| **c == name)
                .map_or_else(|| Selection::Unknown(name.to_string()), |c| Selection::One(*c)),
        }
    }

    fn channels(&self) -> &[&'static str] {
        match self {
            Selection::All => &ALL_CHANNELS,
            Selection::One(channel) => std::slice::from_ref(channel),
            Selection::Unknown(_) => &[],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Printer
// ─────────────────────────────────────────────────────────────────────────────

/// Output format of received messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonRecord<'a, M: Serialize> {
    channel: &'a str,
    recv_utime: i64,
    message: &'a M,
}

/// Serialised writer shared by all subscription callbacks.
#[derive(Clone)]
pub struct Printer {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    format: OutputFormat,
}

impl Printer {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::to_writer(Box::new(std::io::stdout()), format)
    }

    pub fn to_writer(out: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn line(&self, text: &dyn std::fmt::Display) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            debug!(error = %e, "failed to write monitor output");
        }
    }

    fn record<M: Serialize>(&self, channel: &str, rbuf: &ReceiveBuffer, message: &M) {
        let record = JsonRecord {
            channel,
            recv_utime: rbuf.recv_utime,
            message,
        };
        match serde_json::to_string(&record) {
            Ok(json) => self.line(&json),
            Err(e) => warn!(channel, error = %e, "failed to serialise message"),
        }
    }

    fn show<M: Serialize>(
        &self,
        channel: &str,
        rbuf: &ReceiveBuffer,
        message: &M,
        text: impl FnOnce() -> ColoredString,
    ) {
        match self.format {
            OutputFormat::Json => self.record(channel, rbuf, message),
            OutputFormat::Text => self.line(&text()),
        }
    }

    fn lapse(&self, lapse: &HeartbeatLapse) {
        match self.format {
            OutputFormat::Json => self.line(&json!({
                "event": "heartbeat_lost",
                "vehicle_id": lapse.vehicle_id,
                "silent_ms": lapse.silent_for.as_millis() as u64,
            })),
            OutputFormat::Text => self.line(
                &format!(
                    "{}HEARTBEAT LOST from vehicle {} (no heartbeat for {:.1}s)",
                    format_timestamp(now_utime(), &Local),
                    lapse.vehicle_id,
                    lapse.silent_for.as_secs_f64()
                )
                .red()
                .bold(),
            ),
        }
    }

    fn resumed(&self, vehicle_id: i32) {
        match self.format {
            OutputFormat::Json => self.line(&json!({
                "event": "heartbeat_resumed",
                "vehicle_id": vehicle_id,
            })),
            OutputFormat::Text => self.line(
                &format!(
                    "{}HEARTBEAT RESUMED from vehicle {vehicle_id}",
                    format_timestamp(now_utime(), &Local)
                )
                .green()
                .bold(),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitor
// ─────────────────────────────────────────────────────────────────────────────

type SharedWatchdog = Arc<Mutex<Watchdog>>;

fn lock(watchdog: &SharedWatchdog) -> std::sync::MutexGuard<'_, Watchdog> {
    watchdog.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A subscribed LCM handle plus its printer.
pub struct Monitor {
    lcm: Lcm,
    printer: Printer,
    watchdog: Option<SharedWatchdog>,
    poll_timeout: Duration,
}

impl Monitor {
    /// Subscribe `lcm` to the selected channels. A zero `heartbeat_timeout`
    /// disables loss reporting.
    pub fn new(
        mut lcm: Lcm,
        selection: &Selection,
        printer: Printer,
        poll_timeout: Duration,
        heartbeat_timeout: Duration,
    ) -> Result<Self> {
        let watchdog = (!heartbeat_timeout.is_zero())
            .then(|| Arc::new(Mutex::new(Watchdog::new(heartbeat_timeout))));

        for &channel in selection.channels() {
            match channel {
                HEARTBEAT_CHANNEL => {
                    let printer = printer.clone();
                    let watchdog = watchdog.clone();
                    lcm.subscribe_typed(channel, move |rbuf, ch, msg: &Heartbeat| {
                        printer.show(ch, rbuf, msg, || format_heartbeat(msg, &Local).green());
                        if let Some(wd) = &watchdog
                            && lock(wd).heartbeat(msg.vehicle_id) == Some(LivenessChange::Resumed)
                        {
                            printer.resumed(msg.vehicle_id);
                        }
                    })?;
                }
                WARNING_CHANNEL => {
                    let printer = printer.clone();
                    lcm.subscribe_typed(channel, move |rbuf, ch, msg: &Warning| {
                        printer.show(ch, rbuf, msg, || {
                            let text = format_warning(msg, &Local);
                            if msg.danger_detected {
                                text.red().bold()
                            } else {
                                text.yellow()
                            }
                        });
                    })?;
                }
                MODE_CHANNEL => {
                    let printer = printer.clone();
                    lcm.subscribe_typed(channel, move |rbuf, ch, msg: &ModeChange| {
                        printer.show(ch, rbuf, msg, || format_mode(msg, &Local).cyan());
                    })?;
                }
                STATUS_CHANNEL => {
                    let printer = printer.clone();
                    lcm.subscribe_typed(channel, move |rbuf, ch, msg: &Status| {
                        printer.show(ch, rbuf, msg, || format_status(msg, &Local).normal());
                    })?;
                }
                _ => {}
            }
        }

        Ok(Self {
            lcm,
            printer,
            watchdog,
            poll_timeout,
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.lcm.subscription_count()
    }

    /// One receive iteration followed by a liveness check.
    pub fn poll_once(&mut self) -> Result<HandleOutcome> {
        let outcome = self.lcm.handle_timeout(self.poll_timeout)?;
        self.check_liveness();
        Ok(outcome)
    }

    /// Poll until `running` is cleared or the transport fails.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            self.poll_once()?;
        }
        Ok(())
    }

    fn check_liveness(&self) {
        let Some(wd) = &self.watchdog else {
            return;
        };
        let lapses = lock(wd).check_all();
        for lapse in &lapses {
            self.printer.lapse(lapse);
        }
    }
}
