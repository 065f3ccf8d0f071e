//! In-process pin-ownership authority.
//!
//! Implements [`PinOwnership`] with a mutex-guarded set of claimed pin ids.
//! One registry should be shared (via `Arc`) by every driver that can claim
//! pins on the same board.

use std::collections::BTreeSet;
use std::sync::Mutex;

use log::debug;

use crate::error::{PinError, Result};
use crate::ports::PinOwnership;

#[derive(Debug, Default)]
pub struct PinRegistry {
    claimed: Mutex<BTreeSet<String>>,
}

impl PinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, pin: &str) -> bool {
        self.claimed
            .lock()
            .map(|set| set.contains(pin))
            .unwrap_or(false)
    }

    /// Snapshot of every claimed pin id, sorted.
    pub fn claimed(&self) -> Result<Vec<String>> {
        Ok(self.claimed.lock()?.iter().cloned().collect())
    }
}

impl PinOwnership for PinRegistry {
    fn register(&self, pin: &str) -> Result<()> {
        let mut set = self.claimed.lock()?;
        if !set.insert(pin.to_owned()) {
            return Err(PinError::AlreadyClaimed(pin.to_owned()).into());
        }
        debug!("pins: {pin} claimed");
        Ok(())
    }

    fn unregister(&self, pin: &str) -> Result<()> {
        let mut set = self.claimed.lock()?;
        if !set.remove(pin) {
            return Err(PinError::NotRegistered(pin.to_owned()).into());
        }
        debug!("pins: {pin} released");
        Ok(())
    }
}
