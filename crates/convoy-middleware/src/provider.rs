//! The provider seam.
//!
//! An [`Lcm`](crate::Lcm) handle never talks to sockets directly. It asks its
//! [`Provider`] for the next complete message and publishes through the
//! provider's [`PublishSink`]. Two providers ship with the crate:
//!
//! - [`UdpmProvider`](crate::udpm::UdpmProvider) – UDP multicast, the real bus.
//! - [`MemqProvider`] – an in-process loopback queue for tests and offline runs.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use convoy_types::Result;

/// A received message as handed to subscription callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveBuffer {
    /// Encoded message bytes.
    pub data: Vec<u8>,
    /// Receive time in microseconds since the Unix epoch.
    pub recv_utime: i64,
    /// Sending socket; `None` for in-process providers.
    pub sender: Option<SocketAddr>,
}

/// A complete message together with the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub channel: String,
    pub buffer: ReceiveBuffer,
}

impl RawMessage {
    pub fn new(channel: impl Into<String>, data: Vec<u8>, sender: Option<SocketAddr>) -> Self {
        Self {
            channel: channel.into(),
            buffer: ReceiveBuffer {
                data,
                recv_utime: now_utime(),
                sender,
            },
        }
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_utime() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Outbound half of a provider. Shared between threads via [`Arc`].
pub trait PublishSink: Send + Sync {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;
}

/// Inbound half of a provider, owned by one [`Lcm`](crate::Lcm) handle.
pub trait Provider: Send {
    /// Wait up to `timeout` (forever when `None`) for one complete message.
    ///
    /// Returns `Ok(None)` when the wait ends without a message, including
    /// when the wait was interrupted by a signal.
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<RawMessage>>;

    /// The sink used to publish on this provider's bus.
    fn sink(&self) -> Arc<dyn PublishSink>;
}

// ─────────────────────────────────────────────────────────────────────────────
// memq://
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemQueue {
    messages: Mutex<VecDeque<RawMessage>>,
    ready: Condvar,
}

impl PublishSink for MemQueue {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let mut queue = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(RawMessage::new(channel, payload.to_vec(), None));
        self.ready.notify_all();
        Ok(())
    }
}

/// In-process provider: everything published on the handle is received by
/// the same handle, in order.
#[derive(Default)]
pub struct MemqProvider {
    queue: Arc<MemQueue>,
}

impl MemqProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Provider for MemqProvider {
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<RawMessage>> {
        let mut queue = self
            .queue
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(msg) = queue.pop_front() {
                return Ok(Some(msg));
            }
            match deadline {
                None => {
                    queue = self
                        .queue
                        .ready
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(None);
                    }
                    queue = self
                        .queue
                        .ready
                        .wait_timeout(queue, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    fn sink(&self) -> Arc<dyn PublishSink> {
        self.queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn memq_delivers_in_publish_order() {
        let mut provider = MemqProvider::new();
        let sink = provider.sink();
        sink.publish("A", &[1]).unwrap();
        sink.publish("B", &[2]).unwrap();

        let first = provider.recv(Some(Duration::ZERO)).unwrap().unwrap();
        let second = provider.recv(Some(Duration::ZERO)).unwrap().unwrap();
        assert_eq!(first.channel, "A");
        assert_eq!(second.buffer.data, vec![2]);
        assert!(first.buffer.sender.is_none());
    }

    #[test]
    fn memq_times_out_when_empty() {
        let mut provider = MemqProvider::new();
        let started = Instant::now();
        assert!(provider.recv(Some(Duration::from_millis(20))).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn memq_wakes_on_publish_from_another_thread() {
        let mut provider = MemqProvider::new();
        let sink = provider.sink();
        let publisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sink.publish("HEARTBEAT", &[9]).unwrap();
        });
        let msg = provider.recv(None).unwrap().unwrap();
        assert_eq!(msg.channel, "HEARTBEAT");
        publisher.join().unwrap();
    }

    #[test]
    fn receive_time_is_stamped() {
        let before = now_utime();
        let msg = RawMessage::new("X", vec![], None);
        assert!(msg.buffer.recv_utime >= before);
    }
}
