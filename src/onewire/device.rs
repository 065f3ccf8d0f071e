use std::fmt;
use std::sync::{Mutex, MutexGuard, Weak};

use log::{debug, trace};

use super::bus::BusInner;
use crate::error::{Error, Result, ShortTransfer, Transfer};
use crate::ports::{Access, ByteChannel};

/// One slave on a [`OneWireBus`](super::OneWireBus).
///
/// Obtained from [`OneWireBus::open`](super::OneWireBus::open); there is at
/// most one instance per address per bus.  Every call below holds the
/// bus-wide lock for its whole transfer.
pub struct OneWireDevice {
    address: String,
    bus: Weak<BusInner>,
    transaction: Mutex<()>,
}

impl OneWireDevice {
    pub(super) fn new(address: &str, bus: Weak<BusInner>) -> Self {
        Self {
            address: address.to_owned(),
            bus,
            transaction: Mutex::new(()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn read_byte(&self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.with_channel(|ch| read_once(ch, &mut buf))?;
        trace!("onewire: {} read {:#04x}", self.address, buf[0]);
        Ok(buf[0])
    }

    pub fn write_byte(&self, value: u8) -> Result<()> {
        trace!("onewire: {} write {:#04x}", self.address, value);
        self.with_channel(|ch| write_once(ch, &[value]))
    }

    /// Read exactly `count` bytes in a single transfer.
    pub fn read_bytes(&self, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.with_channel(|ch| read_once(ch, &mut buf))?;
        trace!("onewire: {} read {:02x?}", self.address, buf);
        Ok(buf)
    }

    /// Write `data` one byte per call, stopping at the first failure.
    ///
    /// Bytes before the failing one have already reached the device.
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        trace!("onewire: {} write {:02x?}", self.address, data);
        self.with_channel(|ch| {
            for byte in data {
                write_once(ch, std::slice::from_ref(byte))?;
            }
            Ok(())
        })
    }

    /// Close the pseudo-file if it was opened.  The next I/O call reopens it.
    pub fn close(&self) -> Result<()> {
        let Some(bus) = self.bus.upgrade() else {
            // The bus dropped its handles along with itself.
            return Ok(());
        };
        let mut state = bus.lock()?;
        let Some(channel) = state
            .slot_mut(&self.address)
            .and_then(|slot| slot.channel.take())
        else {
            return Ok(());
        };
        channel.close()?;
        debug!("onewire: device {} closed", self.address);
        Ok(())
    }

    /// Whether the pseudo-file is currently open.
    pub fn is_open(&self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        bus.lock()
            .map(|mut state| {
                state
                    .slot_mut(&self.address)
                    .is_some_and(|slot| slot.channel.is_some())
            })
            .unwrap_or(false)
    }

    /// Serialize multi-call protocol transactions on this device.
    ///
    /// Independent of the bus lock: holding it does not block other
    /// devices, and it is not taken by the byte-level calls above.
    pub fn lock_transaction(&self) -> Result<MutexGuard<'_, ()>> {
        Ok(self.transaction.lock()?)
    }

    /// Run `f` on the open handle, holding the bus lock throughout.
    fn with_channel<T>(
        &self,
        f: impl FnOnce(&mut dyn ByteChannel) -> Result<T>,
    ) -> Result<T> {
        let bus = self.bus.upgrade().ok_or(Error::BusGone)?;
        let mut state = bus.lock()?;
        let slot = state.slot_mut(&self.address).ok_or(Error::BusGone)?;

        let channel = match slot.channel.take() {
            Some(channel) => channel,
            None => {
                let path = bus.rw_path(&self.address);
                let channel = bus
                    .fs()
                    .open(&path, Access::ReadWrite)
                    .map_err(|source| Error::Unavailable { path, source })?;
                debug!("onewire: device {} initialized", self.address);
                channel
            }
        };
        let channel = slot.channel.insert(channel);
        f(channel.as_mut())
    }
}

impl fmt::Debug for OneWireDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneWireDevice")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn read_once(ch: &mut dyn ByteChannel, buf: &mut [u8]) -> Result<()> {
    let actual = ch.read(buf)?;
    if actual != buf.len() {
        return Err(ShortTransfer {
            op: Transfer::Read,
            requested: buf.len(),
            actual,
        }
        .into());
    }
    Ok(())
}

fn write_once(ch: &mut dyn ByteChannel, buf: &[u8]) -> Result<()> {
    let actual = ch.write(buf)?;
    if actual != buf.len() {
        return Err(ShortTransfer {
            op: Transfer::Write,
            requested: buf.len(),
            actual,
        }
        .into());
    }
    Ok(())
}
