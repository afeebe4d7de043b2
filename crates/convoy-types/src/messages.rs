//! The `convoy` message schemas.
//!
//! | Type | Channel | Purpose |
//! |---|---|---|
//! | [`Heartbeat`] | `HEARTBEAT` | Liveness beacon, sent every second while in a convoy mode |
//! | [`Warning`] | `WARNING` | Danger/obstacle warning, relayed down the convoy |
//! | [`ModeChange`] | `MODE` | Announces a vehicle's new driving mode |
//! | [`Status`] | `STATUS` | Full snapshot of a vehicle's state |
//!
//! Timestamps are microseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::codec::{Decoder, Encoder, Field, FieldType, LcmMessage};

pub const HEARTBEAT_CHANNEL: &str = "HEARTBEAT";
pub const WARNING_CHANNEL: &str = "WARNING";
pub const MODE_CHANNEL: &str = "MODE";
pub const STATUS_CHANNEL: &str = "STATUS";

/// Every convoy channel, in subscription order.
pub const ALL_CHANNELS: [&str; 4] = [
    HEARTBEAT_CHANNEL,
    WARNING_CHANNEL,
    MODE_CHANNEL,
    STATUS_CHANNEL,
];

/// `convoy.heartbeat_t`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: i64,
    pub vehicle_id: i32,
}

/// `convoy.warning_t`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warning {
    pub timestamp: i64,
    pub vehicle_id: i32,
    pub danger_detected: bool,
    pub description: String,
}

/// `convoy.mode_t`
///
/// `mode` is kept raw so that values outside the known
/// [`DrivingMode`](crate::DrivingMode) range survive decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeChange {
    pub timestamp: i64,
    pub vehicle_id: i32,
    pub mode: i32,
    pub mode_description: String,
}

/// `convoy.status_t`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub timestamp: i64,
    pub vehicle_id: i32,
    pub driving_mode: i32,
    pub motion_detected: bool,
    pub brake_lights_on: bool,
    pub system_running: bool,
    pub status_message: String,
}

impl LcmMessage for Heartbeat {
    const TYPE_NAME: &'static str = "convoy.heartbeat_t";
    const FIELDS: &'static [Field] = &[
        Field::new("timestamp", FieldType::Int64),
        Field::new("vehicle_id", FieldType::Int32),
    ];

    fn encode_fields(&self, enc: &mut Encoder) {
        enc.put_i64(self.timestamp);
        enc.put_i32(self.vehicle_id);
    }

    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: dec.get_i64()?,
            vehicle_id: dec.get_i32()?,
        })
    }
}

impl LcmMessage for Warning {
    const TYPE_NAME: &'static str = "convoy.warning_t";
    const FIELDS: &'static [Field] = &[
        Field::new("timestamp", FieldType::Int64),
        Field::new("vehicle_id", FieldType::Int32),
        Field::new("danger_detected", FieldType::Boolean),
        Field::new("description", FieldType::String),
    ];

    fn encode_fields(&self, enc: &mut Encoder) {
        enc.put_i64(self.timestamp);
        enc.put_i32(self.vehicle_id);
        enc.put_bool(self.danger_detected);
        enc.put_str(&self.description);
    }

    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: dec.get_i64()?,
            vehicle_id: dec.get_i32()?,
            danger_detected: dec.get_bool()?,
            description: dec.get_string()?,
        })
    }
}

impl LcmMessage for ModeChange {
    const TYPE_NAME: &'static str = "convoy.mode_t";
    const FIELDS: &'static [Field] = &[
        Field::new("timestamp", FieldType::Int64),
        Field::new("vehicle_id", FieldType::Int32),
        Field::new("mode", FieldType::Int32),
        Field::new("mode_description", FieldType::String),
    ];

    fn encode_fields(&self, enc: &mut Encoder) {
        enc.put_i64(self.timestamp);
        enc.put_i32(self.vehicle_id);
        enc.put_i32(self.mode);
        enc.put_str(&self.mode_description);
    }

    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: dec.get_i64()?,
            vehicle_id: dec.get_i32()?,
            mode: dec.get_i32()?,
            mode_description: dec.get_string()?,
        })
    }
}

impl LcmMessage for Status {
    const TYPE_NAME: &'static str = "convoy.status_t";
    const FIELDS: &'static [Field] = &[
        Field::new("timestamp", FieldType::Int64),
        Field::new("vehicle_id", FieldType::Int32),
        Field::new("driving_mode", FieldType::Int32),
        Field::new("motion_detected", FieldType::Boolean),
        Field::new("brake_lights_on", FieldType::Boolean),
        Field::new("system_running", FieldType::Boolean),
        Field::new("status_message", FieldType::String),
    ];

    fn encode_fields(&self, enc: &mut Encoder) {
        enc.put_i64(self.timestamp);
        enc.put_i32(self.vehicle_id);
        enc.put_i32(self.driving_mode);
        enc.put_bool(self.motion_detected);
        enc.put_bool(self.brake_lights_on);
        enc.put_bool(self.system_running);
        enc.put_str(&self.status_message);
    }

    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: dec.get_i64()?,
            vehicle_id: dec.get_i32()?,
            driving_mode: dec.get_i32()?,
            motion_detected: dec.get_bool()?,
            brake_lights_on: dec.get_bool()?,
            system_running: dec.get_bool()?,
            status_message: dec.get_string()?,
        })
    }
}
