//! Unified error types for the sysfs peripheral layer.
//!
//! A single `Error` enum that the 1-Wire bus, the DS18B20 protocol and the
//! PWM channel all return.  Protocol and bounds failures live in small
//! `Copy` sub-enums; only the variants that wrap an `io::Error` carry heap
//! data.

use std::fmt;
use std::io;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// A pseudo-file subsystem or a specific pseudo-file is missing or
    /// could not be opened.
    Unavailable { path: PathBuf, source: io::Error },
    /// A read or write on an already-open pseudo-file failed.
    Io(io::Error),
    /// The kernel transferred a different number of bytes than requested.
    ShortTransfer(ShortTransfer),
    /// A sensor transaction failed validation or timed out.
    Sensor(SensorError),
    /// A PWM value was outside the range the hardware accepts.
    Pwm(PwmError),
    /// A pin-ownership request was refused.
    Pin(PinError),
    /// The operation is deliberately not implemented.
    Unsupported(&'static str),
    /// One or more handles failed to close.
    Close(Vec<CloseFailure>),
    /// The owning bus was dropped while a device handle was still in use.
    BusGone,
    /// A lock was poisoned by a panic in another thread.
    Poisoned,
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { path, source } => {
                write!(f, "unavailable: {}: {source}", path.display())
            }
            Self::Io(e) => write!(f, "io: {e}"),
            Self::ShortTransfer(e) => write!(f, "short transfer: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Pwm(e) => write!(f, "pwm: {e}"),
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Unsupported(what) => write!(f, "not supported: {what}"),
            Self::Close(failures) => {
                write!(f, "close failed for {} handle(s)", failures.len())?;
                for failure in failures {
                    write!(f, "; {failure}")?;
                }
                Ok(())
            }
            Self::BusGone => write!(f, "1-wire bus has been dropped"),
            Self::Poisoned => write!(f, "lock poisoned"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } | Self::Io(source) => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

// ---------------------------------------------------------------------------
// Short transfers
// ---------------------------------------------------------------------------

/// Byte-count mismatch on a single read or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortTransfer {
    pub op: Transfer,
    pub requested: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write,
}

impl fmt::Display for ShortTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.op {
            Transfer::Read => "read",
            Transfer::Write => "written",
        };
        write!(
            f,
            "unexpected number ({}) of bytes {verb}, expected {}",
            self.actual, self.requested
        )
    }
}

impl From<ShortTransfer> for Error {
    fn from(e: ShortTransfer) -> Self {
        Self::ShortTransfer(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Scratchpad CRC byte did not match the CRC of the first eight bytes.
    Crc { expected: u8, computed: u8 },
    /// The device never reported conversion complete.
    ConversionTimeout { attempts: u32 },
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc { expected, computed } => {
                write!(f, "CRC error (expected {expected:#04x}, computed {computed:#04x})")
            }
            Self::ConversionTimeout { attempts } => {
                write!(f, "conversion timed out after {attempts} polls")
            }
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// PWM bounds errors
// ---------------------------------------------------------------------------

/// All values are already divided by 10 (the unit written to sysfs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    PeriodOutOfBounds { period: i64, min: i64, max: i64 },
    NegativeDuty { duty: i64 },
    DutyAbovePeriod { duty: i64, period: i64 },
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeriodOutOfBounds { period, min, max } => {
                write!(f, "period {period} is out of bounds, must be in [{min}, {max}]")
            }
            Self::NegativeDuty { duty } => {
                write!(f, "duty {duty} is out of bounds (must be positive)")
            }
            Self::DutyAbovePeriod { duty, period } => {
                write!(f, "duty {duty} is greater than the period {period}")
            }
        }
    }
}

impl From<PwmError> for Error {
    fn from(e: PwmError) -> Self {
        Self::Pwm(e)
    }
}

// ---------------------------------------------------------------------------
// Pin ownership errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinError {
    /// Another owner already holds the pin.
    AlreadyClaimed(String),
    /// Release requested for a pin nobody holds.
    NotRegistered(String),
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClaimed(pin) => write!(f, "pin {pin} is already in use"),
            Self::NotRegistered(pin) => write!(f, "pin {pin} is not registered"),
        }
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Close failures
// ---------------------------------------------------------------------------

/// One handle that failed to close, named by device address or file.
#[derive(Debug)]
pub struct CloseFailure {
    pub name: String,
    pub source: io::Error,
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.source)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
