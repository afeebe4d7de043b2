//! `Relay` trait for discrete on/off vehicle outputs, and the simulated
//! [`BrakeLights`] the vehicle node drives.

use chrono::Local;
use convoy_types::Result;
use tracing::debug;

/// A discrete on/off output such as a lamp or a solenoid.
pub trait Relay: Send + Sync {
    /// Stable identifier, e.g. `"brake_lights"`.
    fn id(&self) -> &str;

    /// Drive the relay to `active`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoyError`](convoy_types::ConvoyError) if the command cannot
    /// be applied.
    fn set_state(&mut self, active: bool) -> Result<()>;

    /// Current state (`true` = on).
    fn state(&self) -> bool;
}

/// Simulated brake lights.
///
/// Each transition prints `[HH:MM:SS] BRAKE LIGHTS ON` (or `OFF`) on stdout
/// in local time. Setting the state it already has prints nothing.
#[derive(Debug, Default)]
pub struct BrakeLights {
    on: bool,
}

impl BrakeLights {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Relay for BrakeLights {
    fn id(&self) -> &str {
        "brake_lights"
    }

    fn set_state(&mut self, active: bool) -> Result<()> {
        if self.on != active {
            self.on = active;
            println!("{}", transition_line(active, &Local::now().format("%H:%M:%S").to_string()));
            debug!(on = active, "brake lights switched");
        }
        Ok(())
    }

    fn state(&self) -> bool {
        self.on
    }
}

fn transition_line(on: bool, clock: &str) -> String {
    format!("[{clock}] BRAKE LIGHTS {}", if on { "ON" } else { "OFF" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brake_lights_toggle() {
        let mut lights = BrakeLights::new();
        assert_eq!(lights.id(), "brake_lights");
        assert!(!lights.state());

        lights.set_state(true).unwrap();
        assert!(lights.state());
        // Repeated command keeps the state.
        lights.set_state(true).unwrap();
        assert!(lights.state());

        lights.set_state(false).unwrap();
        assert!(!lights.state());
    }

    #[test]
    fn transition_line_format() {
        assert_eq!(transition_line(true, "12:30:05"), "[12:30:05] BRAKE LIGHTS ON");
        assert_eq!(transition_line(false, "00:00:00"), "[00:00:00] BRAKE LIGHTS OFF");
    }
}
