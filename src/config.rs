//! Host configuration parameters
//!
//! Where the kernel exposes the 1-Wire and PWM pseudo-files, and how long the
//! DS18B20 protocol waits for a conversion.  Defaults match a stock
//! Raspberry Pi with the `w1-gpio` and `pwm` overlays loaded.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    // --- 1-Wire ---
    /// Root of the w1 subsystem; must exist for the bus to initialise
    pub w1_root: PathBuf,
    /// Directory holding one entry per attached slave
    pub w1_devices_dir: PathBuf,

    // --- PWM ---
    /// PWM chip directory holding `pwm<N>/` channel directories
    pub pwm_chip_dir: PathBuf,

    // --- DS18B20 ---
    pub conversion: PollPolicy,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            w1_root: PathBuf::from("/sys/bus/w1"),
            w1_devices_dir: PathBuf::from("/sys/bus/w1/devices"),
            pwm_chip_dir: PathBuf::from("/sys/class/pwm/pwmchip0"),
            conversion: PollPolicy::default(),
        }
    }
}

impl HostConfig {
    /// Parse and validate a JSON document.  Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the bus or sensor unusable.
    pub fn validate(&self) -> Result<()> {
        if self.w1_root.as_os_str().is_empty() {
            return Err(Error::Config("w1_root must not be empty"));
        }
        if self.w1_devices_dir.as_os_str().is_empty() {
            return Err(Error::Config("w1_devices_dir must not be empty"));
        }
        if self.pwm_chip_dir.as_os_str().is_empty() {
            return Err(Error::Config("pwm_chip_dir must not be empty"));
        }
        self.conversion.validate()
    }

    /// Directory of PWM channel `index`.
    pub fn pwm_channel_dir(&self, index: u8) -> PathBuf {
        self.pwm_chip_dir.join(format!("pwm{index}"))
    }
}

/// Bounds the "wait for conversion complete" poll of the DS18B20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Reads attempted before giving up
    pub max_attempts: u32,
    /// Sleep between two consecutive reads (milliseconds); 0 = busy poll
    pub interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            // 12-bit conversion takes at most 750 ms; allow 2 s.
            max_attempts: 200,
            interval_ms: 10,
        }
    }
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("conversion.max_attempts must be > 0"));
        }
        Ok(())
    }
}
