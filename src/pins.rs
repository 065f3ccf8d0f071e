//! Pin descriptors and the PWM-capable pin table.
//!
//! Single source of truth for which header pins can drive a hardware PWM
//! channel.  The mapping assumes the `pwm-2chan` overlay with its default
//! pin assignment (GPIO 12 → PWM0, GPIO 13 → PWM1); the platform must be
//! configured accordingly before any channel is opened.

/// Identifies one header pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDesc {
    /// Stable pin id, used as the key in the pin-ownership registry.
    pub id: String,
    /// BCM GPIO number.
    pub digital_logical: u32,
}

impl PinDesc {
    pub fn new(id: impl Into<String>, digital_logical: u32) -> Self {
        Self {
            id: id.into(),
            digital_logical,
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware PWM
// ---------------------------------------------------------------------------

/// GPIO 12 (header pin 32) drives PWM channel 0.
pub const PWM0_GPIO: u32 = 12;
/// GPIO 13 (header pin 33) drives PWM channel 1.
pub const PWM1_GPIO: u32 = 13;

/// Hardware PWM channel driven by `gpio`, if any.
pub const fn pwm_channel(gpio: u32) -> Option<u8> {
    match gpio {
        PWM0_GPIO => Some(0),
        PWM1_GPIO => Some(1),
        _ => None,
    }
}
