//! Raspberry Pi peripherals through Linux sysfs pseudo-files.
//!
//! - [`onewire`]: the `w1` bus: a device registry plus byte-level I/O,
//!   serialized by one bus-wide lock.
//! - [`sensors::ds18b20`]: CRC-checked DS18B20 temperature exchange on a
//!   1-Wire device.
//! - [`drivers::pwm`]: bounds-checked hardware PWM channel with a lazy
//!   init / safe shutdown lifecycle.
//!
//! All filesystem access goes through the [`ports::PseudoFs`] trait;
//! [`adapters::SysfsFs`] is the real implementation.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod drivers;
pub mod onewire;
pub mod pins;
pub mod ports;
pub mod sensors;

mod error;

pub use error::{
    CloseFailure, Error, PinError, PwmError, Result, SensorError, ShortTransfer, Transfer,
};
