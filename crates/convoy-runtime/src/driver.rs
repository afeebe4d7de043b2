//! [`VehicleDriver`] – the tokio tasks that keep a [`VehicleNode`] alive.
//!
//! | Task | Kind | Period |
//! |---|---|---|
//! | heartbeat | `tokio::spawn` + interval | [`DriverConfig::heartbeat_period`] |
//! | motion poll | `tokio::spawn` + interval | [`DriverConfig::motion_period`] |
//! | bus receive | `spawn_blocking` around [`Lcm::handle_timeout`] | [`DriverConfig::poll_timeout`] |
//!
//! All three share the node behind a mutex and stop when
//! [`VehicleDriver::shutdown`] is called.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use convoy_hal::MotionSensor;
use convoy_middleware::Lcm;
use convoy_types::{MODE_CHANNEL, ModeChange, Result, WARNING_CHANNEL, Warning};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::vehicle::VehicleNode;

/// Node shared between the driver tasks and the operator console.
pub type SharedNode = Arc<Mutex<VehicleNode>>;

/// Lock a shared node, recovering the state if a task panicked while
/// holding it.
pub fn lock(node: &SharedNode) -> MutexGuard<'_, VehicleNode> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Task periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub heartbeat_period: Duration,
    pub motion_period: Duration,
    pub poll_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(1),
            motion_period: Duration::from_millis(33),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

/// Running vehicle tasks.
pub struct VehicleDriver {
    node: SharedNode,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl VehicleDriver {
    /// Subscribe the node to `WARNING` and `MODE` on `lcm` and start the
    /// tasks. Must be called from within a tokio runtime.
    pub fn spawn(
        node: SharedNode,
        mut lcm: Lcm,
        sensor: Box<dyn MotionSensor>,
        config: DriverConfig,
    ) -> Result<Self> {
        let on_warning = node.clone();
        lcm.subscribe_typed(WARNING_CHANNEL, move |_, _, msg: &Warning| {
            if let Err(e) = lock(&on_warning).on_warning(msg) {
                warn!(error = %e, "failed to handle warning");
            }
        })?;
        let on_mode = node.clone();
        lcm.subscribe_typed(MODE_CHANNEL, move |_, _, msg: &ModeChange| {
            lock(&on_mode).on_mode(msg);
        })?;

        lock(&node).set_running(true);
        let (stop, stopped) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(heartbeat_task(node.clone(), config.heartbeat_period, stopped.clone())),
            tokio::spawn(motion_task(node.clone(), sensor, config.motion_period, stopped.clone())),
            tokio::task::spawn_blocking(move || receive_loop(lcm, config.poll_timeout, stopped)),
        ];
        info!(vehicle_id = lock(&node).vehicle_id(), "vehicle tasks started");
        Ok(Self { node, stop, tasks })
    }

    pub fn node(&self) -> &SharedNode {
        &self.node
    }

    /// Stop every task and wait for them to finish.
    pub async fn shutdown(self) {
        lock(&self.node).set_running(false);
        // Receivers live as long as their tasks.
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "vehicle task ended abnormally");
            }
        }
        info!("vehicle tasks stopped");
    }
}

async fn heartbeat_task(node: SharedNode, period: Duration, mut stopped: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = lock(&node).heartbeat_tick() {
                    warn!(error = %e, "failed to publish heartbeat");
                }
            }
            _ = stopped.changed() => break,
        }
    }
}

async fn motion_task(
    node: SharedNode,
    mut sensor: Box<dyn MotionSensor>,
    period: Duration,
    mut stopped: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = match sensor.poll() {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!(sensor = sensor.id(), error = %e, "motion sensor read failed");
                        continue;
                    }
                };
                if let Err(e) = lock(&node).update_motion(reading) {
                    warn!(error = %e, "failed to apply motion reading");
                }
            }
            _ = stopped.changed() => break,
        }
    }
}

fn receive_loop(mut lcm: Lcm, timeout: Duration, stopped: watch::Receiver<bool>) {
    while !*stopped.borrow() {
        if let Err(e) = lcm.handle_timeout(timeout) {
            warn!(error = %e, "LCM handler error");
            std::thread::sleep(timeout);
        }
    }
}
