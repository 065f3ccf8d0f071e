//! Hardware PWM channel driven through `/sys/class/pwm/pwmchip0/pwm<N>/`.
//!
//! ## Units
//!
//! Callers pass nanoseconds.  Every value is divided by 10 (integer
//! division) before it is validated, stored and written, and all stored
//! values and bounds below are in that scaled unit.
//!
//! ## Lifecycle
//!
//! 1. [`PwmChannel::new`] checks the pin against the PWM pin table (an
//!    unsupported pin is a programming error and panics) and claims it from
//!    the pin-ownership authority.
//! 2. The first setter call opens `enable`, `duty_cycle`, `period` and
//!    `polarity`, writes the safe defaults (normal polarity, default period
//!    and duty) and enables the output.
//! 3. [`PwmChannel::close`] releases the pin and, if step 2 ever ran,
//!    rewrites the defaults with the output disabled.
//!
//! ## Safety contract
//!
//! The period always stays within `PWM_MIN_PULSE_WIDTH..=PWM_MAX_PULSE_WIDTH`
//! and a duty is only accepted when `0 <= duty <= period`.  A rejected value
//! leaves both the stored state and the sysfs files untouched.
//! [`PwmChannel::set_period`] does not re-check the current duty, so shrink
//! the duty first when shortening the period.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};
use log::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{CloseFailure, Error, PwmError, Result, ShortTransfer, Transfer};
use crate::pins::{self, PinDesc};
use crate::ports::{Access, ByteChannel, PinOwnership, PseudoFs};

/// Default duty cycle, in nanoseconds.
pub const PWM_DEFAULT_DUTY: i64 = 500_000_000;
/// Default period, in nanoseconds.
pub const PWM_DEFAULT_PERIOD: i64 = 1_000_000_000;
pub const PWM_DEFAULT_POLARITY: Polarity = Polarity::Normal;

/// Shortest accepted period (scaled).
pub const PWM_MIN_PULSE_WIDTH: i64 = 1090;
/// Longest accepted period (scaled).
pub const PWM_MAX_PULSE_WIDTH: i64 = 1_000_000_000;

const NS_PER_UNIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    /// Integer code written to the `polarity` file.
    pub const fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Inversed => 1,
        }
    }
}

// ── Attribute files ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attr {
    Enable,
    DutyCycle,
    Period,
    Polarity,
}

impl Attr {
    const ALL: [Self; 4] = [Self::Enable, Self::DutyCycle, Self::Period, Self::Polarity];

    const fn file_name(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::DutyCycle => "duty_cycle",
            Self::Period => "period",
            Self::Polarity => "polarity",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The four open attribute files of one channel, in [`Attr::ALL`] order.
struct PwmFiles {
    handles: Vec<Box<dyn ByteChannel>>,
}

impl PwmFiles {
    /// Open every attribute file.  If any open fails, the handles acquired
    /// so far are closed before the error is returned.
    fn open(fs: &dyn PseudoFs, dir: &Path) -> Result<Self> {
        let mut handles = Vec::with_capacity(Attr::ALL.len());
        for attr in Attr::ALL {
            let path = dir.join(attr.file_name());
            match fs.open(&path, Access::WriteOnly) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    warn!("pwm: unable to open {}: {source}", path.display());
                    release(handles);
                    return Err(Error::Unavailable { path, source });
                }
            }
        }
        Ok(Self { handles })
    }

    fn write(&mut self, attr: Attr, value: impl fmt::Display) -> Result<()> {
        let text = format!("{value}\n");
        let actual = self.handles[attr.index()].write(text.as_bytes())?;
        if actual != text.len() {
            return Err(ShortTransfer {
                op: Transfer::Write,
                requested: text.len(),
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Safe configuration: normal polarity, default period and duty.
    fn reset(&mut self, enable: bool) -> Result<()> {
        self.write(Attr::Polarity, "normal")?;
        self.write(Attr::Period, PWM_DEFAULT_PERIOD / NS_PER_UNIT)?;
        self.write(Attr::DutyCycle, PWM_DEFAULT_DUTY / NS_PER_UNIT)?;
        self.write(Attr::Enable, u8::from(enable))
    }

    fn close(self) -> Result<()> {
        let failures = release(self.handles);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(failures))
        }
    }
}

/// Close every handle in `handles` (a prefix of [`Attr::ALL`]), reporting
/// the ones that failed.
fn release(handles: Vec<Box<dyn ByteChannel>>) -> Vec<CloseFailure> {
    Attr::ALL
        .into_iter()
        .zip(handles)
        .filter_map(|(attr, handle)| {
            handle.close().err().map(|source| {
                warn!("pwm: closing {} failed: {source}", attr.file_name());
                CloseFailure {
                    name: attr.file_name().to_owned(),
                    source,
                }
            })
        })
        .collect()
}

// ── Channel ───────────────────────────────────────────────────

/// One hardware PWM output.
///
/// Not internally synchronized: mutating calls take `&mut self`.
pub struct PwmChannel {
    pin: PinDesc,
    channel: u8,
    dir: PathBuf,
    fs: Arc<dyn PseudoFs>,
    owner: Arc<dyn PinOwnership>,
    files: Option<PwmFiles>,
    duty: i64,
    period: i64,
    polarity: Polarity,
}

impl PwmChannel {
    /// Bind `pin` to its hardware channel and claim it from `owner`.
    ///
    /// No file is opened until the first setter call.
    ///
    /// # Panics
    ///
    /// If `pin` is not in the PWM pin table.
    pub fn new(
        pin: PinDesc,
        fs: Arc<dyn PseudoFs>,
        owner: Arc<dyn PinOwnership>,
        config: &HostConfig,
    ) -> Result<Self> {
        let Some(channel) = pins::pwm_channel(pin.digital_logical) else {
            panic!("pin {} does not support pwm", pin.digital_logical);
        };
        owner.register(&pin.id)?;

        Ok(Self {
            dir: config.pwm_channel_dir(channel),
            pin,
            channel,
            fs,
            owner,
            files: None,
            duty: 0,
            period: 0,
            polarity: PWM_DEFAULT_POLARITY,
        })
    }

    pub fn pin_id(&self) -> &str {
        &self.pin.id
    }

    /// Hardware channel index under the PWM chip.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_initialized(&self) -> bool {
        self.files.is_some()
    }

    /// Current period (scaled).
    pub fn period(&self) -> i64 {
        self.period
    }

    /// Current duty cycle (scaled).
    pub fn duty(&self) -> i64 {
        self.duty
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn set_period(&mut self, ns: i64) -> Result<()> {
        let period = ns / NS_PER_UNIT;
        self.init()?;

        if !(PWM_MIN_PULSE_WIDTH..=PWM_MAX_PULSE_WIDTH).contains(&period) {
            return Err(PwmError::PeriodOutOfBounds {
                period,
                min: PWM_MIN_PULSE_WIDTH,
                max: PWM_MAX_PULSE_WIDTH,
            }
            .into());
        }

        self.write(Attr::Period, period)?;
        self.period = period;
        Ok(())
    }

    pub fn set_duty(&mut self, ns: i64) -> Result<()> {
        let duty = ns / NS_PER_UNIT;
        self.init()?;

        if duty > self.period {
            return Err(PwmError::DutyAbovePeriod {
                duty,
                period: self.period,
            }
            .into());
        }
        if duty < 0 {
            return Err(PwmError::NegativeDuty { duty }.into());
        }

        self.write(Attr::DutyCycle, duty)?;
        self.duty = duty;
        Ok(())
    }

    pub fn set_polarity(&mut self, polarity: Polarity) -> Result<()> {
        self.write(Attr::Polarity, polarity.code())?;
        self.polarity = polarity;
        Ok(())
    }

    /// Map `value` (`0..=255`) linearly onto `[0, period]`.
    pub fn set_analog(&mut self, value: u8) -> Result<()> {
        self.init()?;
        let duty_ns = i64::from(value) * self.period * NS_PER_UNIT / i64::from(u8::MAX);
        self.set_duty(duty_ns)
    }

    /// Servo-style pulse width.  Not implemented.
    pub fn set_microseconds(&mut self, _us: i64) -> Result<()> {
        Err(Error::Unsupported("set_microseconds"))
    }

    /// Release the pin and, if the channel was ever initialized, disable the
    /// output and restore the defaults.
    ///
    /// The reset runs even when releasing the pin fails; the release error
    /// is the one reported.
    pub fn close(mut self) -> Result<()> {
        let released = self.owner.unregister(&self.pin.id);

        let reset = match self.files.take() {
            None => Ok(()),
            Some(mut files) => {
                let reset = files.reset(false);
                let closed = files.close();
                info!("pwm: channel {} ({}) shut down", self.channel, self.pin.id);
                reset.and(closed)
            }
        };

        released.and(reset)
    }

    // ── Internal ──────────────────────────────────────────────

    /// Open the attribute files and apply the safe configuration once.
    fn init(&mut self) -> Result<&mut PwmFiles> {
        let files = match self.files.take() {
            Some(files) => files,
            None => {
                let mut files = PwmFiles::open(self.fs.as_ref(), &self.dir)?;
                if let Err(e) = files.reset(true) {
                    // Errors from closing are logged by release().
                    let _ = files.close();
                    return Err(e);
                }
                self.period = PWM_DEFAULT_PERIOD / NS_PER_UNIT;
                self.duty = PWM_DEFAULT_DUTY / NS_PER_UNIT;
                self.polarity = PWM_DEFAULT_POLARITY;
                debug!("pwm: channel {} initialized at {}", self.channel, self.dir.display());
                files
            }
        };
        Ok(self.files.insert(files))
    }

    fn write(&mut self, attr: Attr, value: impl fmt::Display) -> Result<()> {
        self.init()?.write(attr, value)
    }
}

impl fmt::Debug for PwmChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PwmChannel")
            .field("pin", &self.pin.id)
            .field("channel", &self.channel)
            .field("initialized", &self.is_initialized())
            .field("period", &self.period)
            .field("duty", &self.duty)
            .field("polarity", &self.polarity)
            .finish_non_exhaustive()
    }
}

// ── embedded-hal ──────────────────────────────────────────────

impl embedded_hal::pwm::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for PwmChannel {
    type Error = Error;
}

/// Duty as a fraction of `u16::MAX` of the current period.
impl SetDutyCycle for PwmChannel {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<()> {
        self.init()?;
        let duty_ns = i64::from(duty) * self.period * NS_PER_UNIT / i64::from(u16::MAX);
        self.set_duty(duty_ns)
    }
}
