//! Port traits: the boundary between the bus/channel logic and the kernel.
//!
//! ```text
//!   SysfsFs / test fs ──▶ PseudoFs ──▶ OneWireBus, PwmChannel
//!   PinRegistry       ──▶ PinOwnership ──▶ PwmChannel
//! ```
//!
//! The 1-Wire and PWM code never calls `std::fs` directly.  Everything goes
//! through [`PseudoFs`], so the integration tests can swap in an in-memory
//! filesystem with scripted devices.

use std::io;
use std::path::Path;

// ───────────────────────────────────────────────────────────────
// Byte channel (one open pseudo-file)
// ───────────────────────────────────────────────────────────────

/// An exclusively owned byte stream backed by one pseudo-file.
///
/// Implementations report the raw byte count of each call; callers decide
/// whether a partial transfer is an error.
pub trait ByteChannel: Send {
    /// Read up to `buf.len()` bytes in a single call.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes in a single call.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Release the underlying handle.  The channel is unusable afterwards.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// How a pseudo-file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Bidirectional stream, e.g. a w1 slave's `rw` file.
    ReadWrite,
    /// Write-only attribute, e.g. a PWM `period` file.
    WriteOnly,
}

// ───────────────────────────────────────────────────────────────
// Pseudo-filesystem (driven adapter: kernel → crate)
// ───────────────────────────────────────────────────────────────

/// The subset of filesystem operations the bus and channel code needs.
pub trait PseudoFs: Send + Sync {
    /// Open a pseudo-file.  Fails if it does not exist.
    fn open(&self, path: &Path, access: Access) -> io::Result<Box<dyn ByteChannel>>;

    /// Whether `path` exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Names of the entries directly under `dir`, in any order.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;
}

// ───────────────────────────────────────────────────────────────
// Pin ownership authority
// ───────────────────────────────────────────────────────────────

/// Tracks which pins are claimed so two drivers cannot drive one pin.
pub trait PinOwnership: Send + Sync {
    /// Claim `pin`.  Fails with [`PinError::AlreadyClaimed`](crate::PinError)
    /// if someone else holds it.
    fn register(&self, pin: &str) -> crate::Result<()>;

    /// Release `pin`.
    fn unregister(&self, pin: &str) -> crate::Result<()>;
}
