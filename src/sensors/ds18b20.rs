//! DS18B20 digital thermometer over the w1 `rw` file.
//!
//! One temperature read is a four-step exchange:
//!
//! 1. `0x44` Convert T
//! 2. poll single bytes until the device answers non-zero (conversion done)
//! 3. `0xBE` Read Scratchpad
//! 4. read 9 bytes, check the CRC-8/Maxim in byte 8
//!
//! The kernel's `w1_therm` driver would do the same on a read of
//! `w1_slave`; going through `rw` lets us pick the resolution and bound the
//! conversion wait ourselves.
//!
//! ## Locking
//!
//! A whole exchange runs under the device's transaction lock, so any number
//! of `Ds18b20` values wrapping the same device serialize their
//! transactions.  Individual bytes additionally go through the bus lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI16, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::PollPolicy;
use crate::error::{Result, SensorError, ShortTransfer, Transfer};
use crate::onewire::OneWireDevice;

/// Family code prefix of DS18B20 slave directories.
pub const FAMILY_PREFIX: &str = "28-";

pub const SCRATCHPAD_LEN: usize = 9;

const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;
const CMD_WRITE_SCRATCHPAD: u8 = 0x4E;
const CMD_COPY_SCRATCHPAD: u8 = 0x48;

/// °C per LSB of the raw reading.
const CELSIUS_PER_LSB: f32 = 0.0625;
/// °F per LSB (0.0625 * 9/5).
const FAHRENHEIT_PER_LSB: f32 = 0.1125;

pub fn is_ds18b20(address: &str) -> bool {
    address.starts_with(FAMILY_PREFIX)
}

// ---------------------------------------------------------------------------
// CRC-8/Maxim
// ---------------------------------------------------------------------------

/// Lookup table for the reflected polynomial 0x8C (x^8 + x^5 + x^4 + 1).
static CRC8_TABLE: [u8; 256] = build_crc8_table();

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8C } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Dallas/Maxim CRC-8 of `data`, starting from 0.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    /// Configuration register value written by `set_resolution`.
    pub const fn config_code(self) -> u8 {
        match self {
            Self::Bits9 => 0x1F,
            Self::Bits10 => 0x3F,
            Self::Bits11 => 0x5F,
            Self::Bits12 => 0x7F,
        }
    }

    /// Decode R1/R0 (bits 6..5) of a configuration register.
    pub const fn from_config(config: u8) -> Self {
        match config & 0x60 {
            0x00 => Self::Bits9,
            0x20 => Self::Bits10,
            0x40 => Self::Bits11,
            _ => Self::Bits12,
        }
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            9 => Some(Self::Bits9),
            10 => Some(Self::Bits10),
            11 => Some(Self::Bits11),
            12 => Some(Self::Bits12),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits9 => 9,
            Self::Bits10 => 10,
            Self::Bits11 => 11,
            Self::Bits12 => 12,
        }
    }

    /// Worst-case conversion time from the datasheet.
    pub const fn conversion_time(self) -> Duration {
        match self {
            Self::Bits9 => Duration::from_micros(93_750),
            Self::Bits10 => Duration::from_micros(187_500),
            Self::Bits11 => Duration::from_millis(375),
            Self::Bits12 => Duration::from_millis(750),
        }
    }

    /// Low bits that are undefined at this resolution are cleared.
    const fn raw_mask(self) -> i16 {
        match self {
            Self::Bits9 => !0b111,
            Self::Bits10 => !0b11,
            Self::Bits11 => !0b1,
            Self::Bits12 => !0,
        }
    }
}

// ---------------------------------------------------------------------------
// Scratchpad
// ---------------------------------------------------------------------------

/// The 9-byte register block returned by Read Scratchpad.
///
/// | byte | content              |
/// |------|----------------------|
/// | 0, 1 | temperature LSB, MSB |
/// | 2, 3 | TH, TL alarm         |
/// | 4    | configuration        |
/// | 5..8 | reserved             |
/// | 8    | CRC of bytes 0..8    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; SCRATCHPAD_LEN]);

impl Scratchpad {
    pub const fn new(bytes: [u8; SCRATCHPAD_LEN]) -> Self {
        Self(bytes)
    }

    /// `None` unless `bytes` is exactly nine bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; SCRATCHPAD_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; SCRATCHPAD_LEN] {
        &self.0
    }

    pub fn crc(&self) -> u8 {
        self.0[8]
    }

    pub fn computed_crc(&self) -> u8 {
        crc8(&self.0[..8])
    }

    pub fn validate(&self) -> std::result::Result<(), SensorError> {
        let computed = self.computed_crc();
        if computed != self.crc() {
            return Err(SensorError::Crc {
                expected: self.crc(),
                computed,
            });
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.0[4])
    }

    /// Signed temperature in 1/16 °C, with the bits the configured
    /// resolution leaves undefined cleared.
    pub fn raw(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]]) & self.resolution().raw_mask()
    }
}

pub fn celsius_from_raw(raw: i16) -> f32 {
    f32::from(raw) * CELSIUS_PER_LSB
}

pub fn fahrenheit_from_raw(raw: i16) -> f32 {
    f32::from(raw) * FAHRENHEIT_PER_LSB + 32.0
}

// ---------------------------------------------------------------------------
// Protocol driver
// ---------------------------------------------------------------------------

pub struct Ds18b20 {
    device: Arc<OneWireDevice>,
    raw: AtomicI16,
    poll: PollPolicy,
}

impl Ds18b20 {
    /// Wrap an opened device, using the default conversion poll policy.
    pub fn new(device: Arc<OneWireDevice>) -> Self {
        Self::with_poll_policy(device, PollPolicy::default())
    }

    pub fn with_poll_policy(device: Arc<OneWireDevice>, poll: PollPolicy) -> Self {
        Self {
            device,
            raw: AtomicI16::new(0),
            poll,
        }
    }

    pub fn device(&self) -> &Arc<OneWireDevice> {
        &self.device
    }

    /// Run a full conversion and store the result.
    ///
    /// On any error the previously stored reading is kept.
    pub fn read_temperature(&self) -> Result<()> {
        let _txn = self.device.lock_transaction()?;

        self.device.write_byte(CMD_CONVERT_T)?;
        self.wait_for_conversion()?;

        self.device.write_byte(CMD_READ_SCRATCHPAD)?;
        let bytes = self.device.read_bytes(SCRATCHPAD_LEN)?;
        let pad = Scratchpad::from_slice(&bytes).ok_or(ShortTransfer {
            op: Transfer::Read,
            requested: SCRATCHPAD_LEN,
            actual: bytes.len(),
        })?;
        pad.validate()?;

        let raw = pad.raw();
        self.raw.store(raw, Ordering::Release);
        debug!(
            "ds18b20: {} raw={raw:#06x} ({} C, {}-bit)",
            self.device.address(),
            celsius_from_raw(raw),
            pad.resolution().bits()
        );
        Ok(())
    }

    /// Last successfully read value in 1/16 °C.
    pub fn raw(&self) -> i16 {
        self.raw.load(Ordering::Acquire)
    }

    pub fn celsius(&self) -> f32 {
        celsius_from_raw(self.raw())
    }

    pub fn fahrenheit(&self) -> f32 {
        fahrenheit_from_raw(self.raw())
    }

    /// Write the configuration register and copy it to EEPROM.
    ///
    /// Aborts at the first failed byte; the device may then hold a partially
    /// written scratchpad.
    pub fn set_resolution(&self, resolution: Resolution) -> Result<()> {
        let _txn = self.device.lock_transaction()?;

        // TH and TL alarm registers are left at zero.
        for byte in [
            CMD_WRITE_SCRATCHPAD,
            0x00,
            0x00,
            resolution.config_code(),
            CMD_COPY_SCRATCHPAD,
        ] {
            self.device.write_byte(byte)?;
        }
        debug!(
            "ds18b20: {} resolution set to {} bits",
            self.device.address(),
            resolution.bits()
        );
        Ok(())
    }

    fn wait_for_conversion(&self) -> Result<()> {
        let max = self.poll.max_attempts;
        let interval = self.poll.interval();
        for attempt in 1..=max {
            if self.device.read_byte()? != 0 {
                return Ok(());
            }
            if attempt < max && !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        Err(SensorError::ConversionTimeout { attempts: max }.into())
    }
}
