//! Sensor protocols that run on top of the bus abstractions.

pub mod ds18b20;

pub use ds18b20::{Ds18b20, Resolution, Scratchpad};
