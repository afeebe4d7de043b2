//! [`VehicleNode`] – the convoy behaviour of one vehicle.
//!
//! The node owns the vehicle's state and applies the driving-mode rules:
//!
//! | Mode | Motion detected | No motion | Warning from a peer |
//! |---|---|---|---|
//! | 0 Single Vehicle | brake lights on | brake lights off | logged |
//! | 1 Head in Convoy | brake lights on, `WARNING` published | brake lights off | logged |
//! | 2 In Convoy | ignored | ignored | brake lights on, warning relayed |
//!
//! Convoy modes (1 and 2) also publish a `HEARTBEAT` on every
//! [`VehicleNode::heartbeat_tick`].
//!
//! The node is synchronous; the tasks in [`crate::driver`] share it behind a
//! mutex and feed it sensor readings, timer ticks and received messages.

use std::collections::VecDeque;

use convoy_hal::Relay;
use convoy_middleware::{Publisher, now_utime};
use convoy_types::{
    ConvoyError, DrivingMode, HEARTBEAT_CHANNEL, Heartbeat, MODE_CHANNEL, ModeChange, Result,
    STATUS_CHANNEL, Status, WARNING_CHANNEL, Warning,
};
use tracing::{debug, info};

use crate::event_log::EventLog;

/// Description carried by warnings raised by the motion sensor.
pub const MOTION_WARNING: &str = "Motion detected";
/// Description carried by warnings repeated down the convoy.
pub const RELAYED_WARNING: &str = "Warning relayed";
/// Description of the operator's test warning.
pub const MANUAL_WARNING: &str = "Manual test warning";

/// Originating timestamps remembered to stop relay loops.
///
/// A relayed warning carries the relayer's id and the originator's
/// timestamp, so the timestamp alone identifies a warning across hops. Two
/// distinct warnings raised in the same microsecond are relayed once.
const RELAY_MEMORY: usize = 64;

/// State and rules of one vehicle.
pub struct VehicleNode {
    vehicle_id: i32,
    mode: DrivingMode,
    motion_detected: bool,
    /// A warning went out for the obstacle currently in view (mode 1 only).
    warned: bool,
    brake_lights: Box<dyn Relay>,
    running: bool,
    publisher: Publisher,
    log: EventLog,
    relayed: VecDeque<i64>,
}

impl VehicleNode {
    /// A node in [`DrivingMode::Single`] with brake lights off.
    pub fn new(vehicle_id: i32, publisher: Publisher, brake_lights: Box<dyn Relay>) -> Self {
        Self {
            vehicle_id,
            mode: DrivingMode::default(),
            motion_detected: false,
            warned: false,
            brake_lights,
            running: false,
            publisher,
            log: EventLog::new(),
            relayed: VecDeque::with_capacity(RELAY_MEMORY),
        }
    }

    pub fn vehicle_id(&self) -> i32 {
        self.vehicle_id
    }

    pub fn driving_mode(&self) -> DrivingMode {
        self.mode
    }

    pub fn motion_detected(&self) -> bool {
        self.motion_detected
    }

    pub fn brake_lights_on(&self) -> bool {
        self.brake_lights.state()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    // ── Operator actions ────────────────────────────────────────────────────

    /// Switch to the raw mode `raw` and announce it on `MODE`.
    ///
    /// # Errors
    ///
    /// [`ConvoyError::Config`] for values outside `0..=2`, or the publish
    /// error. The mode is unchanged on either.
    pub fn set_driving_mode(&mut self, raw: i32) -> Result<DrivingMode> {
        let mode = DrivingMode::from_raw(raw)
            .ok_or_else(|| ConvoyError::Config(format!("invalid driving mode: {raw}")))?;
        let old = self.mode;

        self.publisher.publish_typed(
            MODE_CHANNEL,
            &ModeChange {
                timestamp: now_utime(),
                vehicle_id: self.vehicle_id,
                mode: mode.as_raw(),
                mode_description: mode.name().to_string(),
            },
        )?;
        self.mode = mode;
        if mode != old {
            // An obstacle already in view counts as new in the new mode.
            self.warned = false;
        }
        self.event(&format!(
            "Driving mode changed from {} to {} ({})",
            old.as_raw(),
            mode.as_raw(),
            mode.name()
        ));
        Ok(mode)
    }

    /// Publish a warning raised by this vehicle.
    pub fn send_warning(&mut self, description: &str) -> Result<()> {
        self.publish_warning(now_utime(), description)
    }

    /// Publish a full `STATUS` snapshot.
    pub fn send_status(&mut self) -> Result<()> {
        self.publisher.publish_typed(
            STATUS_CHANNEL,
            &Status {
                timestamp: now_utime(),
                vehicle_id: self.vehicle_id,
                driving_mode: self.mode.as_raw(),
                motion_detected: self.motion_detected,
                brake_lights_on: self.brake_lights_on(),
                system_running: self.running,
                status_message: format!("Vehicle {} operational", self.vehicle_id),
            },
        )?;
        self.event(&format!("Status message sent from vehicle {}", self.vehicle_id));
        Ok(())
    }

    // ── Periodic inputs ─────────────────────────────────────────────────────

    /// Apply one motion reading. Warnings and log entries are raised when
    /// motion starts, not on every reading. In mode 1 an obstacle that was
    /// already in view when the mode was entered still raises one warning.
    pub fn update_motion(&mut self, detected: bool) -> Result<()> {
        let started = detected && !self.motion_detected;
        self.motion_detected = detected;
        if !detected {
            self.warned = false;
        }

        match self.mode {
            DrivingMode::Single => {
                self.set_brakes(detected)?;
                if started {
                    self.event("Mode 0: Object detected, brake lights ON");
                }
            }
            DrivingMode::HeadInConvoy => {
                self.set_brakes(detected)?;
                if detected && !self.warned {
                    self.publish_warning(now_utime(), MOTION_WARNING)?;
                    self.warned = true;
                    self.event("Mode 1: Object detected, brake lights ON, warning sent");
                }
            }
            DrivingMode::InConvoy => {}
        }
        Ok(())
    }

    /// Publish a heartbeat if the vehicle is in a convoy mode. Returns
    /// whether one was sent.
    pub fn heartbeat_tick(&mut self) -> Result<bool> {
        if !self.mode.is_convoy() {
            return Ok(false);
        }
        let timestamp = now_utime();
        self.publisher.publish_typed(
            HEARTBEAT_CHANNEL,
            &Heartbeat {
                timestamp,
                vehicle_id: self.vehicle_id,
            },
        )?;
        // Recorded but not echoed: one line per second would drown the prompt.
        self.log.record(&format!(
            "Heartbeat sent from vehicle {}: {timestamp}",
            self.vehicle_id
        ));
        debug!(vehicle_id = self.vehicle_id, timestamp, "heartbeat sent");
        Ok(true)
    }

    // ── Bus inputs ──────────────────────────────────────────────────────────

    /// React to a `WARNING` from the bus.
    pub fn on_warning(&mut self, msg: &Warning) -> Result<()> {
        if msg.vehicle_id == self.vehicle_id {
            return Ok(());
        }
        self.event(&format!(
            "Received warning from vehicle {}: {}",
            msg.vehicle_id, msg.description
        ));
        if self.mode != DrivingMode::InConvoy {
            return Ok(());
        }

        self.set_brakes(true)?;
        if self.relayed.contains(&msg.timestamp) {
            debug!(timestamp = msg.timestamp, "warning already relayed");
            return Ok(());
        }
        if self.relayed.len() == RELAY_MEMORY {
            self.relayed.pop_front();
        }
        self.relayed.push_back(msg.timestamp);
        self.publish_warning(msg.timestamp, RELAYED_WARNING)?;
        self.event(&format!("Warning received and repeated: {}", msg.timestamp));
        Ok(())
    }

    /// Note a peer's `MODE` announcement.
    pub fn on_mode(&mut self, msg: &ModeChange) {
        if msg.vehicle_id == self.vehicle_id {
            return;
        }
        self.event(&format!(
            "Vehicle {} changed mode to {}: {}",
            msg.vehicle_id, msg.mode, msg.mode_description
        ));
    }

    // ── Reports ─────────────────────────────────────────────────────────────

    /// Multi-line status block shown by the `s` command.
    pub fn status_report(&self) -> String {
        let yes_no = |b: bool| if b { "YES" } else { "NO" };
        format!(
            "=== Status ===\n\
             Vehicle ID: {}\n\
             Driving Mode: {} ({})\n\
             Motion Detected: {}\n\
             Brake Lights: {}\n\
             System Running: {}\n",
            self.vehicle_id,
            self.mode.as_raw(),
            self.mode.name(),
            yes_no(self.motion_detected),
            if self.brake_lights_on() { "ON" } else { "OFF" },
            yes_no(self.running),
        )
    }

    /// The last `n` event log entries, oldest first.
    pub fn recent_log(&self, n: usize) -> Vec<String> {
        self.log.recent(n)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn publish_warning(&mut self, timestamp: i64, description: &str) -> Result<()> {
        self.publisher.publish_typed(
            WARNING_CHANNEL,
            &Warning {
                timestamp,
                vehicle_id: self.vehicle_id,
                danger_detected: true,
                description: description.to_string(),
            },
        )?;
        self.event(&format!(
            "Warning message sent from vehicle {}: {timestamp}",
            self.vehicle_id
        ));
        Ok(())
    }

    fn set_brakes(&mut self, on: bool) -> Result<()> {
        self.brake_lights.set_state(on)
    }

    fn event(&mut self, message: &str) {
        info!(vehicle_id = self.vehicle_id, "{message}");
        println!("{}", self.log.record(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_hal::BrakeLights;
    use convoy_middleware::{HandleOutcome, Lcm};
    use convoy_types::LcmMessage;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Everything the node published, in order, as `(channel, bytes)`.
    fn drain(lcm: &mut Lcm) -> Vec<(String, Vec<u8>)> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = lcm
            .subscribe(".*", move |rbuf, ch| {
                sink.lock().unwrap().push((ch.to_string(), rbuf.data.clone()))
            })
            .unwrap();
        while lcm.handle_timeout(Duration::from_millis(20)).unwrap() == HandleOutcome::Handled {}
        lcm.unsubscribe(id);
        Arc::try_unwrap(seen).unwrap().into_inner().unwrap()
    }

    fn channels(published: &[(String, Vec<u8>)]) -> Vec<&str> {
        published.iter().map(|(c, _)| c.as_str()).collect()
    }

    fn node(id: i32) -> (VehicleNode, Lcm) {
        let lcm = Lcm::new("memq://").unwrap();
        let node = VehicleNode::new(id, lcm.publisher(), Box::new(BrakeLights::new()));
        (node, lcm)
    }

    /// Publishes through a bus whose sends always fail.
    fn unreachable_node(id: i32) -> VehicleNode {
        struct Down;
        impl convoy_middleware::PublishSink for Down {
            fn publish(&self, _: &str, _: &[u8]) -> Result<()> {
                Err(ConvoyError::Transport("network unreachable".into()))
            }
        }
        impl convoy_middleware::Provider for Down {
            fn recv(&mut self, _: Option<Duration>) -> Result<Option<convoy_middleware::RawMessage>> {
                Ok(None)
            }
            fn sink(&self) -> Arc<dyn convoy_middleware::PublishSink> {
                Arc::new(Down)
            }
        }
        let lcm = Lcm::with_provider(convoy_middleware::ProviderUrl::Memq, Box::new(Down));
        VehicleNode::new(id, lcm.publisher(), Box::new(BrakeLights::new()))
    }

    fn warning_from(vehicle_id: i32, timestamp: i64) -> Warning {
        Warning {
            timestamp,
            vehicle_id,
            danger_detected: true,
            description: MOTION_WARNING.to_string(),
        }
    }

    #[test]
    fn set_driving_mode_announces_mode() {
        let (mut node, mut lcm) = node(3);
        assert_eq!(node.set_driving_mode(1).unwrap(), DrivingMode::HeadInConvoy);

        let published = drain(&mut lcm);
        assert_eq!(channels(&published), vec!["MODE"]);
        let msg = ModeChange::decode(&published[0].1).unwrap();
        assert_eq!(msg.vehicle_id, 3);
        assert_eq!(msg.mode, 1);
        assert_eq!(msg.mode_description, "Head in Convoy");
        assert!(node.recent_log(1)[0].ends_with("Driving mode changed from 0 to 1 (Head in Convoy)"));
    }

    #[test]
    fn invalid_driving_mode_is_rejected() {
        let (mut node, mut lcm) = node(1);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);

        assert!(matches!(node.set_driving_mode(3), Err(ConvoyError::Config(_))));
        assert_eq!(node.driving_mode(), DrivingMode::InConvoy);
        assert!(drain(&mut lcm).is_empty());
    }

    #[test]
    fn failed_mode_announcement_keeps_old_mode() {
        let mut node = unreachable_node(1);
        assert!(matches!(node.set_driving_mode(1), Err(ConvoyError::Transport(_))));
        assert_eq!(node.driving_mode(), DrivingMode::Single);
        assert!(node.recent_log(10).is_empty());
    }

    #[test]
    fn single_mode_motion_drives_brakes_only() {
        let (mut node, mut lcm) = node(1);
        node.update_motion(true).unwrap();
        assert!(node.brake_lights_on());
        assert!(node.motion_detected());
        node.update_motion(false).unwrap();
        assert!(!node.brake_lights_on());
        assert!(drain(&mut lcm).is_empty());
    }

    #[test]
    fn head_mode_warns_once_per_motion_onset() {
        let (mut node, mut lcm) = node(1);
        node.set_driving_mode(1).unwrap();
        drain(&mut lcm);

        node.update_motion(true).unwrap();
        node.update_motion(true).unwrap();
        assert!(node.brake_lights_on());
        let published = drain(&mut lcm);
        assert_eq!(channels(&published), vec!["WARNING"]);
        let warning = Warning::decode(&published[0].1).unwrap();
        assert!(warning.danger_detected);
        assert_eq!(warning.description, MOTION_WARNING);
        assert_eq!(warning.vehicle_id, 1);

        node.update_motion(false).unwrap();
        assert!(!node.brake_lights_on());
        node.update_motion(true).unwrap();
        assert_eq!(channels(&drain(&mut lcm)), vec!["WARNING"]);
    }

    #[test]
    fn head_mode_warns_about_obstacle_seen_before_entering_it() {
        let (mut node, mut lcm) = node(1);
        node.update_motion(true).unwrap();
        node.set_driving_mode(1).unwrap();
        assert_eq!(channels(&drain(&mut lcm)), vec!["MODE"]);

        for _ in 0..5 {
            node.update_motion(true).unwrap();
        }
        assert!(node.brake_lights_on());
        assert_eq!(channels(&drain(&mut lcm)), vec!["WARNING"]);
    }

    #[test]
    fn head_mode_warns_again_after_leaving_and_reentering() {
        let (mut node, mut lcm) = node(1);
        node.set_driving_mode(1).unwrap();
        node.update_motion(true).unwrap();
        node.set_driving_mode(2).unwrap();
        node.update_motion(true).unwrap();
        node.set_driving_mode(1).unwrap();
        node.update_motion(true).unwrap();
        assert_eq!(
            channels(&drain(&mut lcm)),
            vec!["MODE", "WARNING", "MODE", "MODE", "WARNING"]
        );
    }

    #[test]
    fn convoy_mode_ignores_motion() {
        let (mut node, mut lcm) = node(2);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);
        node.update_motion(true).unwrap();
        assert!(!node.brake_lights_on());
        assert!(node.motion_detected());
        assert!(drain(&mut lcm).is_empty());
    }

    #[test]
    fn follower_brakes_and_relays_peer_warning() {
        let (mut node, mut lcm) = node(2);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);

        node.on_warning(&warning_from(1, 1_700_000_000_000_000)).unwrap();
        assert!(node.brake_lights_on());
        let published = drain(&mut lcm);
        assert_eq!(channels(&published), vec!["WARNING"]);
        let relayed = Warning::decode(&published[0].1).unwrap();
        assert_eq!(relayed.vehicle_id, 2);
        assert_eq!(relayed.timestamp, 1_700_000_000_000_000);
        assert_eq!(relayed.description, RELAYED_WARNING);
    }

    #[test]
    fn follower_relays_each_warning_once() {
        let (mut node, mut lcm) = node(2);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);

        node.on_warning(&warning_from(1, 42)).unwrap();
        // The next follower's relay of the same warning comes back.
        node.on_warning(&warning_from(3, 42)).unwrap();
        assert_eq!(channels(&drain(&mut lcm)), vec!["WARNING"]);

        node.on_warning(&warning_from(1, 43)).unwrap();
        assert_eq!(channels(&drain(&mut lcm)), vec!["WARNING"]);
    }

    #[test]
    fn relay_memory_forgets_oldest_timestamp() {
        let (mut node, mut lcm) = node(2);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);

        for ts in 0..RELAY_MEMORY as i64 {
            node.on_warning(&warning_from(1, ts)).unwrap();
        }
        assert_eq!(drain(&mut lcm).len(), RELAY_MEMORY);

        // Still remembered.
        node.on_warning(&warning_from(1, 0)).unwrap();
        assert!(drain(&mut lcm).is_empty());

        // One more pushes timestamp 0 out, so it is relayed again.
        node.on_warning(&warning_from(1, RELAY_MEMORY as i64)).unwrap();
        node.on_warning(&warning_from(1, 0)).unwrap();
        let published = drain(&mut lcm);
        assert_eq!(published.len(), 2);
        assert_eq!(Warning::decode(&published[1].1).unwrap().timestamp, 0);

        // Timestamp 2 is still within the window.
        node.on_warning(&warning_from(3, 2)).unwrap();
        assert!(drain(&mut lcm).is_empty());
    }

    #[test]
    fn own_and_non_follower_warnings_do_not_brake() {
        let (mut node, mut lcm) = node(5);
        node.set_driving_mode(2).unwrap();
        drain(&mut lcm);
        node.on_warning(&warning_from(5, 1)).unwrap();
        assert!(!node.brake_lights_on());

        node.set_driving_mode(0).unwrap();
        node.on_warning(&warning_from(1, 2)).unwrap();
        assert!(!node.brake_lights_on());
        assert!(node.recent_log(1)[0].contains("Received warning from vehicle 1"));
        assert_eq!(channels(&drain(&mut lcm)), vec!["MODE"]);
    }

    #[test]
    fn heartbeat_only_in_convoy_modes() {
        let (mut node, mut lcm) = node(4);
        assert!(!node.heartbeat_tick().unwrap());
        assert!(drain(&mut lcm).is_empty());

        for raw in [1, 2] {
            node.set_driving_mode(raw).unwrap();
            drain(&mut lcm);
            assert!(node.heartbeat_tick().unwrap());
            let published = drain(&mut lcm);
            assert_eq!(channels(&published), vec!["HEARTBEAT"]);
            assert_eq!(Heartbeat::decode(&published[0].1).unwrap().vehicle_id, 4);
        }
    }

    #[test]
    fn status_snapshot_reflects_state() {
        let (mut node, mut lcm) = node(6);
        node.set_running(true);
        node.update_motion(true).unwrap();
        node.send_status().unwrap();

        let published = drain(&mut lcm);
        let status = Status::decode(&published[0].1).unwrap();
        assert_eq!(status.vehicle_id, 6);
        assert_eq!(status.driving_mode, 0);
        assert!(status.motion_detected);
        assert!(status.brake_lights_on);
        assert!(status.system_running);
        assert_eq!(status.status_message, "Vehicle 6 operational");
    }

    #[test]
    fn peer_mode_change_is_logged() {
        let (mut node, _lcm) = node(1);
        node.on_mode(&ModeChange {
            timestamp: 0,
            vehicle_id: 2,
            mode: 2,
            mode_description: "In Convoy".into(),
        });
        assert!(node.recent_log(1)[0].ends_with("Vehicle 2 changed mode to 2: In Convoy"));

        node.on_mode(&ModeChange {
            vehicle_id: 1,
            ..ModeChange::default()
        });
        assert_eq!(node.recent_log(10).len(), 1);
    }

    #[test]
    fn status_report_lists_state() {
        let (mut node, _lcm) = node(9);
        node.set_driving_mode(1).unwrap();
        let report = node.status_report();
        assert!(report.contains("Driving Mode: 1 (Head in Convoy)"));
        assert!(report.contains("Brake Lights: OFF"));
        assert!(report.contains("System Running: NO"));
    }

    #[test]
    fn manual_warning_is_published() {
        let (mut node, mut lcm) = node(1);
        node.send_warning(MANUAL_WARNING).unwrap();
        let published = drain(&mut lcm);
        assert_eq!(
            Warning::decode(&published[0].1).unwrap().description,
            MANUAL_WARNING
        );
    }
}
