//! Fuzz target: `HostConfig::from_json`
//!
//! Arbitrary text must either parse into a configuration that passes
//! `validate()` or be rejected with an error. Never a panic.
//!
//! cargo fuzz run fuzz_host_config

#![no_main]

use libfuzzer_sys::fuzz_target;
use rpi_periph::config::HostConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = HostConfig::from_json(text) {
        assert!(config.validate().is_ok(), "from_json returned an invalid config");
        let _ = config.pwm_channel_dir(0);
    }
});
