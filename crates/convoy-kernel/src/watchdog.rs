//! [`Watchdog`] – per-vehicle heartbeat liveness.
//!
//! Vehicles in a convoy publish a heartbeat every second. The watchdog
//! remembers when each vehicle was last heard from and reports, once per
//! outage, the vehicles that have gone silent for longer than the shared
//! timeout. A heartbeat from a silent vehicle ends the outage.
//!
//! A zero timeout disables loss detection; heartbeats are still tracked.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Liveness of a single vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleHealth {
    /// Heard from within the timeout.
    Healthy,
    /// Silent for longer than the timeout.
    TimedOut,
    /// Never heard from.
    Unknown,
}

/// Edge reported by [`Watchdog::heartbeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    /// First heartbeat ever seen from this vehicle.
    Discovered,
    /// Heartbeat from a vehicle that had been reported lost.
    Resumed,
}

/// A vehicle that has just been declared lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatLapse {
    pub vehicle_id: i32,
    /// Time since the last heartbeat at the moment of detection.
    pub silent_for: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct VehicleEntry {
    last_heartbeat: Instant,
    lost: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats per vehicle id and detects vehicles that went silent.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use convoy_kernel::watchdog::{LivenessChange, VehicleHealth, Watchdog};
///
/// let mut wd = Watchdog::new(Duration::from_secs(3));
/// assert_eq!(wd.heartbeat(7), Some(LivenessChange::Discovered));
/// assert_eq!(wd.heartbeat(7), None);
/// assert_eq!(wd.health(7), VehicleHealth::Healthy);
/// assert_eq!(wd.health(8), VehicleHealth::Unknown);
/// ```
pub struct Watchdog {
    timeout: Duration,
    vehicles: HashMap<i32, VehicleEntry>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            vehicles: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether loss detection is active (non-zero timeout).
    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Record a heartbeat from `vehicle_id`.
    pub fn heartbeat(&mut self, vehicle_id: i32) -> Option<LivenessChange> {
        self.heartbeat_at(vehicle_id, Instant::now())
    }

    fn heartbeat_at(&mut self, vehicle_id: i32, now: Instant) -> Option<LivenessChange> {
        match self.vehicles.get_mut(&vehicle_id) {
            None => {
                self.vehicles.insert(
                    vehicle_id,
                    VehicleEntry {
                        last_heartbeat: now,
                        lost: false,
                    },
                );
                info!(vehicle_id, "new vehicle on the bus");
                Some(LivenessChange::Discovered)
            }
            Some(entry) => {
                entry.last_heartbeat = now;
                if std::mem::replace(&mut entry.lost, false) {
                    info!(vehicle_id, "heartbeat resumed");
                    Some(LivenessChange::Resumed)
                } else {
                    None
                }
            }
        }
    }

    /// Liveness of `vehicle_id`.
    pub fn health(&self, vehicle_id: i32) -> VehicleHealth {
        match self.vehicles.get(&vehicle_id) {
            None => VehicleHealth::Unknown,
            Some(entry) if self.expired(entry, Instant::now()) => VehicleHealth::TimedOut,
            Some(_) => VehicleHealth::Healthy,
        }
    }

    /// Vehicles that have gone silent since the previous call, sorted by id.
    /// Each outage is reported once.
    pub fn check_all(&mut self) -> Vec<HeartbeatLapse> {
        self.check_all_at(Instant::now())
    }

    fn check_all_at(&mut self, now: Instant) -> Vec<HeartbeatLapse> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let timeout = self.timeout;
        let mut lapses: Vec<HeartbeatLapse> = self
            .vehicles
            .iter_mut()
            .filter(|(_, entry)| !entry.lost && now.duration_since(entry.last_heartbeat) > timeout)
            .map(|(&vehicle_id, entry)| {
                entry.lost = true;
                HeartbeatLapse {
                    vehicle_id,
                    silent_for: now.duration_since(entry.last_heartbeat),
                }
            })
            .collect();
        lapses.sort_by_key(|l| l.vehicle_id);
        for lapse in &lapses {
            warn!(vehicle_id = lapse.vehicle_id, silent_ms = lapse.silent_for.as_millis() as u64, "heartbeat lost");
        }
        lapses
    }

    /// Every vehicle ever heard from, sorted by id.
    pub fn tracked(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.vehicles.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn expired(&self, entry: &VehicleEntry, now: Instant) -> bool {
        self.is_enabled() && now.duration_since(entry.last_heartbeat) > self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn first_heartbeat_discovers_vehicle() {
        let mut wd = Watchdog::new(SECOND);
        assert_eq!(wd.heartbeat(1), Some(LivenessChange::Discovered));
        assert_eq!(wd.heartbeat(1), None);
        assert_eq!(wd.health(1), VehicleHealth::Healthy);
    }

    #[test]
    fn unknown_vehicle_health() {
        let wd = Watchdog::new(SECOND);
        assert_eq!(wd.health(42), VehicleHealth::Unknown);
    }

    #[test]
    fn silent_vehicle_is_reported_once() {
        let mut wd = Watchdog::new(SECOND);
        let start = Instant::now();
        wd.heartbeat_at(3, start);

        assert!(wd.check_all_at(start + Duration::from_millis(900)).is_empty());

        let lapses = wd.check_all_at(start + Duration::from_millis(1500));
        assert_eq!(
            lapses,
            vec![HeartbeatLapse {
                vehicle_id: 3,
                silent_for: Duration::from_millis(1500),
            }]
        );
        // Same outage, not reported again.
        assert!(wd.check_all_at(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn heartbeat_after_lapse_resumes() {
        let mut wd = Watchdog::new(SECOND);
        let start = Instant::now();
        wd.heartbeat_at(2, start);
        assert_eq!(wd.check_all_at(start + 2 * SECOND).len(), 1);

        assert_eq!(
            wd.heartbeat_at(2, start + 3 * SECOND),
            Some(LivenessChange::Resumed)
        );
        assert_eq!(wd.heartbeat_at(2, start + 3 * SECOND), None);

        // A second outage is reported again.
        assert_eq!(wd.check_all_at(start + 5 * SECOND).len(), 1);
    }

    #[test]
    fn lapses_are_sorted_by_vehicle_id() {
        let mut wd = Watchdog::new(SECOND);
        let start = Instant::now();
        for id in [9, 4, 6] {
            wd.heartbeat_at(id, start);
        }
        wd.heartbeat_at(6, start + SECOND);
        let ids: Vec<i32> = wd
            .check_all_at(start + Duration::from_millis(1500))
            .iter()
            .map(|l| l.vehicle_id)
            .collect();
        assert_eq!(ids, vec![4, 9]);
        assert_eq!(wd.tracked(), vec![4, 6, 9]);
    }

    #[test]
    fn zero_timeout_disables_loss_detection() {
        let mut wd = Watchdog::new(Duration::ZERO);
        assert!(!wd.is_enabled());
        let start = Instant::now();
        wd.heartbeat_at(1, start);
        assert!(wd.check_all_at(start + 60 * SECOND).is_empty());
        assert_eq!(wd.health(1), VehicleHealth::Healthy);
    }

    #[test]
    fn health_times_out_when_silent() {
        let mut wd = Watchdog::new(Duration::from_millis(20));
        wd.heartbeat(5);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.health(5), VehicleHealth::TimedOut);
        wd.heartbeat(5);
        assert_eq!(wd.health(5), VehicleHealth::Healthy);
    }
}
