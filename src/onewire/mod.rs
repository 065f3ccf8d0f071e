//! 1-Wire bus access through the kernel `w1` subsystem.
//!
//! ```text
//!   OneWireBus ──open(addr)──▶ Arc<OneWireDevice> ──▶ <devices>/<addr>/rw
//!        │                            │
//!        └──── one Mutex<BusState> ◀──┘  (registry + every open handle)
//! ```
//!
//! ## Locking
//!
//! The bus owns a single lock.  `open` takes it to update the registry, and
//! every byte-level read or write on *any* device of the bus takes it for
//! the duration of the transfer.  Two devices on the same bus therefore never
//! see overlapping I/O, even though each has its own pseudo-file.  The device
//! handles live inside the locked registry, so there is no code path that
//! reaches a handle without holding the bus lock.
//!
//! Multi-step protocols (see [`crate::sensors::ds18b20`]) additionally take
//! the per-device transaction lock from [`OneWireDevice::lock_transaction`].

mod bus;
mod device;

pub use bus::OneWireBus;
pub use device::OneWireDevice;
