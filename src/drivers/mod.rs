//! Actuator drivers.

pub mod pwm;

pub use pwm::{Polarity, PwmChannel};
