//! `convoy-types` – shared vocabulary of the convoy stack.
//!
//! # Modules
//!
//! - [`codec`] – the LCM binary encoding (big-endian fields behind an 8-byte
//!   type fingerprint) and the compile-time fingerprint hash.
//! - [`messages`] – the four `convoy` message schemas exchanged by vehicles:
//!   [`Heartbeat`], [`Warning`], [`ModeChange`] and [`Status`].
//!
//! [`DrivingMode`] and [`ConvoyError`] live at the crate root because every
//! other crate in the workspace uses them.

pub mod codec;
pub mod messages;

pub use codec::{Decoder, Encoder, Field, FieldType, LcmMessage};
pub use messages::{
    ALL_CHANNELS, HEARTBEAT_CHANNEL, Heartbeat, MODE_CHANNEL, ModeChange, STATUS_CHANNEL, Status,
    WARNING_CHANNEL, Warning,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Driving mode of a vehicle in the convoy.
///
/// The wire carries the raw `int32`; use [`DrivingMode::from_raw`] to
/// interpret it and [`mode_name`] to display values that may be out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrivingMode {
    /// Driving alone; motion triggers the brake lights only.
    #[default]
    Single = 0,
    /// Leading a convoy; motion also warns the followers.
    HeadInConvoy = 1,
    /// Following in a convoy; brake lights follow received warnings.
    InConvoy = 2,
}

impl DrivingMode {
    /// Every mode, in wire order.
    pub const ALL: [DrivingMode; 3] = [
        DrivingMode::Single,
        DrivingMode::HeadInConvoy,
        DrivingMode::InConvoy,
    ];

    /// Interpret a raw wire value. Returns `None` outside `0..=2`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(DrivingMode::Single),
            1 => Some(DrivingMode::HeadInConvoy),
            2 => Some(DrivingMode::InConvoy),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Human-readable name, e.g. `"Head in Convoy"`.
    pub fn name(self) -> &'static str {
        match self {
            DrivingMode::Single => "Single Vehicle",
            DrivingMode::HeadInConvoy => "Head in Convoy",
            DrivingMode::InConvoy => "In Convoy",
        }
    }

    /// Whether the vehicle takes part in a convoy (and therefore sends
    /// heartbeats).
    pub fn is_convoy(self) -> bool {
        !matches!(self, DrivingMode::Single)
    }
}

impl std::fmt::Display for DrivingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a raw driving mode value, `"Unknown"` when out of range.
pub fn mode_name(raw: i32) -> &'static str {
    DrivingMode::from_raw(raw).map_or("Unknown", DrivingMode::name)
}

/// Error type shared by the transport, the vehicle runtime and the CLIs.
#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Fingerprint Mismatch: expected {expected:#018x}, found {found:#018x}")]
    FingerprintMismatch { expected: u64, found: u64 },

    #[error("Invalid Provider URL: {0}")]
    InvalidUrl(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel name too long: {0} bytes (max 63)")]
    ChannelTooLong(usize),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Invalid channel pattern: {0}")]
    InvalidPattern(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConvoyError>;
