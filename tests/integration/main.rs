//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the in-memory pseudo-filesystem in `mock_fs`.  All tests run on
//! the host with no 1-Wire or PWM hardware required.

mod ds18b20_tests;
mod mock_fs;
