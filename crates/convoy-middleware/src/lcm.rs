//! [`Lcm`] – the transport handle.
//!
//! One handle owns one provider. Subscriptions pair an anchored channel
//! regex with a callback; [`Lcm::handle_timeout`] waits for the next message
//! that at least one subscription wants and runs every matching callback, in
//! registration order, on the calling thread.
//!
//! Publishing does not need the handle to be borrowed mutably: clone a
//! [`Publisher`] with [`Lcm::publisher`] and move it wherever messages are
//! produced.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use convoy_middleware::{HandleOutcome, Lcm};
//! use convoy_types::{Heartbeat, HEARTBEAT_CHANNEL};
//!
//! let mut lcm = Lcm::new("memq://").unwrap();
//! lcm.subscribe_typed(HEARTBEAT_CHANNEL, |_rbuf, _channel, hb: &Heartbeat| {
//!     assert_eq!(hb.vehicle_id, 4);
//! })
//! .unwrap();
//!
//! lcm.publish_typed(HEARTBEAT_CHANNEL, &Heartbeat { timestamp: 0, vehicle_id: 4 })
//!     .unwrap();
//! let outcome = lcm.handle_timeout(Duration::from_millis(100)).unwrap();
//! assert_eq!(outcome, HandleOutcome::Handled);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use convoy_types::{ConvoyError, LcmMessage, Result};
use regex::Regex;
use tracing::{trace, warn};

use crate::packet::validate_channel;
use crate::provider::{MemqProvider, Provider, PublishSink, RawMessage, ReceiveBuffer};
use crate::udpm::UdpmProvider;
use crate::url::ProviderUrl;

/// Callback invoked with the raw buffer and the channel it arrived on.
pub type Handler = Box<dyn FnMut(&ReceiveBuffer, &str) + Send>;

/// Identifies a subscription for [`Lcm::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of one [`Lcm::handle_timeout`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A message was dispatched to at least one subscription.
    Handled,
    /// The timeout elapsed (or a signal interrupted the wait) first.
    TimedOut,
}

struct Subscription {
    id: SubscriptionId,
    pattern: Regex,
    handler: Handler,
}

/// Cloneable publishing handle, usable from any thread.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn PublishSink>,
}

impl Publisher {
    /// Publish raw bytes on `channel`.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        validate_channel(channel)?;
        self.sink.publish(channel, payload)
    }

    /// Encode `msg` and publish it on `channel`.
    pub fn publish_typed<M: LcmMessage>(&self, channel: &str, msg: &M) -> Result<()> {
        self.publish(channel, &msg.encode())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

/// Handle on an LCM bus.
pub struct Lcm {
    url: ProviderUrl,
    provider: Box<dyn Provider>,
    publisher: Publisher,
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl Lcm {
    /// Open a handle on the bus described by `url` (empty for the default).
    pub fn new(url: &str) -> Result<Self> {
        let url = ProviderUrl::parse(url)?;
        let provider: Box<dyn Provider> = match &url {
            ProviderUrl::Udpm(params) => Box::new(UdpmProvider::open(params.clone())?),
            ProviderUrl::Memq => Box::new(MemqProvider::new()),
        };
        Ok(Self::with_provider(url, provider))
    }

    /// Wrap an already constructed provider.
    pub fn with_provider(url: ProviderUrl, provider: Box<dyn Provider>) -> Self {
        let publisher = Publisher {
            sink: provider.sink(),
        };
        Self {
            url,
            provider,
            publisher,
            subscriptions: Vec::new(),
            next_id: 0,
        }
    }

    pub fn url(&self) -> &ProviderUrl {
        &self.url
    }

    /// A publishing handle that shares this handle's bus.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.publisher.publish(channel, payload)
    }

    pub fn publish_typed<M: LcmMessage>(&self, channel: &str, msg: &M) -> Result<()> {
        self.publisher.publish_typed(channel, msg)
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    /// Register `handler` for every channel fully matching the regular
    /// expression `channel`.
    pub fn subscribe<F>(&mut self, channel: &str, handler: F) -> Result<SubscriptionId>
    where
        F: FnMut(&ReceiveBuffer, &str) + Send + 'static,
    {
        let pattern = Regex::new(&format!("^(?:{channel})$"))
            .map_err(|e| ConvoyError::InvalidPattern(format!("'{channel}': {e}")))?;
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            pattern,
            handler: Box::new(handler),
        });
        Ok(id)
    }

    /// Like [`Lcm::subscribe`], but decodes each message as `M` first.
    /// Messages that fail to decode are logged and skipped.
    pub fn subscribe_typed<M, F>(&mut self, channel: &str, mut handler: F) -> Result<SubscriptionId>
    where
        M: LcmMessage + 'static,
        F: FnMut(&ReceiveBuffer, &str, &M) + Send + 'static,
    {
        self.subscribe(channel, move |rbuf, channel| match M::decode(&rbuf.data) {
            Ok(msg) => handler(rbuf, channel, &msg),
            Err(e) => warn!(channel, error = %e, "failed to decode {}", M::TYPE_NAME),
        })
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ── Receive loop ────────────────────────────────────────────────────────

    /// Wait up to `timeout` for one message that has a subscriber and
    /// dispatch it. Messages nobody subscribed to are discarded without
    /// ending the wait.
    pub fn handle_timeout(&mut self, timeout: Duration) -> Result<HandleOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let Some(msg) = self.provider.recv(Some(left))? else {
                return Ok(HandleOutcome::TimedOut);
            };
            if self.dispatch(&msg) > 0 {
                return Ok(HandleOutcome::Handled);
            }
            if Instant::now() >= deadline {
                return Ok(HandleOutcome::TimedOut);
            }
        }
    }

    /// Block until one message with a subscriber has been dispatched.
    ///
    /// Returns early with [`HandleOutcome::TimedOut`] only when the wait is
    /// interrupted by a signal.
    pub fn handle(&mut self) -> Result<HandleOutcome> {
        loop {
            let Some(msg) = self.provider.recv(None)? else {
                return Ok(HandleOutcome::TimedOut);
            };
            if self.dispatch(&msg) > 0 {
                return Ok(HandleOutcome::Handled);
            }
        }
    }

    fn dispatch(&mut self, msg: &RawMessage) -> usize {
        let mut delivered = 0;
        for sub in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.pattern.is_match(&msg.channel))
        {
            (sub.handler)(&msg.buffer, &msg.channel);
            delivered += 1;
        }
        if delivered == 0 {
            trace!(channel = %msg.channel, "no subscriber; message dropped");
        }
        delivered
    }
}

impl std::fmt::Debug for Lcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lcm")
            .field("url", &self.url.to_string())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
