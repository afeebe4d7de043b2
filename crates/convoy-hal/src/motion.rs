//! `MotionSensor` trait for obstacle detection in front of the vehicle.
//!
//! The vehicle node polls its sensor at a fixed period and feeds the result
//! into its driving-mode rules. Two sensors ship with the crate:
//!
//! | Sensor | Source of readings |
//! |---|---|
//! | [`ManualMotionSensor`] | A shared flag flipped by an operator (the vehicle REPL's `m` command) |
//! | [`ScriptedMotionSensor`] | A fixed sequence, for tests and demos |

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use convoy_types::Result;

/// Anything that can report whether motion is currently detected.
pub trait MotionSensor: Send {
    /// Stable identifier, e.g. `"front_camera"`.
    fn id(&self) -> &str;

    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoyError`](convoy_types::ConvoyError) if the sensor cannot
    /// be read.
    fn poll(&mut self) -> Result<bool>;
}

/// Operator-controlled sensor. Clones share one flag, so one clone can be
/// polled by the node while another is toggled from the command line.
#[derive(Debug, Clone, Default)]
pub struct ManualMotionSensor {
    detected: Arc<AtomicBool>,
}

impl ManualMotionSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, detected: bool) {
        self.detected.store(detected, Ordering::Relaxed);
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&self) -> bool {
        !self.detected.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_detected(&self) -> bool {
        self.detected.load(Ordering::Relaxed)
    }
}

impl MotionSensor for ManualMotionSensor {
    fn id(&self) -> &str {
        "manual"
    }

    fn poll(&mut self) -> Result<bool> {
        Ok(self.is_detected())
    }
}

/// Replays a fixed list of readings, then repeats the last one forever
/// (`false` if the list was empty).
#[derive(Debug, Clone)]
pub struct ScriptedMotionSensor {
    readings: VecDeque<bool>,
    last: bool,
}

impl ScriptedMotionSensor {
    pub fn new(readings: impl IntoIterator<Item = bool>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: false,
        }
    }
}

impl MotionSensor for ScriptedMotionSensor {
    fn id(&self) -> &str {
        "scripted"
    }

    fn poll(&mut self) -> Result<bool> {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}
