//! `convoy-hal` – hardware seams of a convoy vehicle.
//!
//! | Module | Trait | Shipped implementations |
//! |---|---|---|
//! | [`relay`] | [`Relay`] | [`BrakeLights`] |
//! | [`motion`] | [`MotionSensor`] | [`ManualMotionSensor`], [`ScriptedMotionSensor`] |

pub mod motion;
pub mod relay;

pub use motion::{ManualMotionSensor, MotionSensor, ScriptedMotionSensor};
pub use relay::{BrakeLights, Relay};
