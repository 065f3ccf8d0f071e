//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements    | Connects to                   |
//! |----------------|---------------|-------------------------------|
//! | `sysfs`        | PseudoFs      | `/sys` through `std::fs`      |
//! |                | ByteChannel   | one open sysfs file           |
//! | `pin_registry` | PinOwnership  | in-process set of claimed pins|

pub mod pin_registry;
pub mod sysfs;

pub use pin_registry::PinRegistry;
pub use sysfs::SysfsFs;
