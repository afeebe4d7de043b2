//! `convoy-middleware` – the convoy bus.
//!
//! A Lightweight Communications and Marshalling (LCM) transport, wire
//! compatible with other LCM implementations on the same multicast group.
//! It moves bytes between channels without caring what they mean; typed
//! decoding is layered on top through [`convoy_types::LcmMessage`].
//!
//! # Modules
//!
//! - [`lcm`] – [`Lcm`] handle: subscriptions, [`Lcm::handle_timeout`] receive
//!   loop, and the cloneable [`Publisher`].
//! - [`url`] – provider URL parsing (`udpm://group:port?ttl=N`, `memq://`).
//! - [`provider`] – the [`Provider`] seam and the in-process [`MemqProvider`].
//! - [`udpm`] – UDP multicast provider built on `socket2`.
//! - [`packet`] – short-message and fragment framing.
//! - [`reassembly`] – bounded per-sender fragment reassembly.

pub mod lcm;
pub mod packet;
pub mod provider;
pub mod reassembly;
pub mod udpm;
pub mod url;

pub use lcm::{HandleOutcome, Handler, Lcm, Publisher, SubscriptionId};
pub use provider::{MemqProvider, Provider, PublishSink, RawMessage, ReceiveBuffer, now_utime};
pub use udpm::UdpmProvider;
pub use url::{DEFAULT_URL, ProviderUrl, UdpmParams};
