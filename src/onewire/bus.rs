use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use super::device::OneWireDevice;
use crate::config::HostConfig;
use crate::error::{CloseFailure, Error, Result};
use crate::ports::{ByteChannel, PseudoFs};

/// A 1-Wire bus and the registry of devices opened on it.
pub struct OneWireBus {
    inner: Arc<BusInner>,
}

pub(super) struct BusInner {
    id: u8,
    fs: Arc<dyn PseudoFs>,
    root: PathBuf,
    devices_dir: PathBuf,
    state: Mutex<BusState>,
}

#[derive(Default)]
pub(super) struct BusState {
    initialized: bool,
    devices: BTreeMap<String, Slot>,
}

/// Registry entry.  `channel` is `None` until the device's first I/O call.
pub(super) struct Slot {
    device: Arc<OneWireDevice>,
    pub(super) channel: Option<Box<dyn ByteChannel>>,
}

impl OneWireBus {
    /// Create bus `id`.  Nothing is touched on disk until first use.
    pub fn new(id: u8, fs: Arc<dyn PseudoFs>, config: &HostConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                id,
                fs,
                root: config.w1_root.clone(),
                devices_dir: config.w1_devices_dir.clone(),
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    pub fn id(&self) -> u8 {
        self.inner.id
    }

    /// Return the device registered for `address`, creating it on first
    /// request.  The device's pseudo-file is not opened here.
    pub fn open(&self, address: &str) -> Result<Arc<OneWireDevice>> {
        let mut state = self.inner.lock()?;
        self.inner.init(&mut state)?;

        if let Some(slot) = state.devices.get(address) {
            return Ok(Arc::clone(&slot.device));
        }

        let device = Arc::new(OneWireDevice::new(address, Arc::downgrade(&self.inner)));
        state.devices.insert(
            address.to_owned(),
            Slot {
                device: Arc::clone(&device),
                channel: None,
            },
        );
        Ok(device)
    }

    /// Names of every entry in the devices directory, sorted.
    ///
    /// This is a plain directory read; the kernel's bus-master entries
    /// (`w1_bus_master1`) are included.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        let dir = &self.inner.devices_dir;
        let mut names = self.inner.fs.list_dir(dir).map_err(|source| Error::Unavailable {
            path: dir.clone(),
            source,
        })?;
        names.sort();
        Ok(names)
    }

    /// [`list_devices`](Self::list_devices) filtered by family-code prefix,
    /// e.g. `"28-"` for DS18B20 sensors.
    pub fn devices_with_family(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = self.list_devices()?;
        names.retain(|name| name.starts_with(prefix));
        Ok(names)
    }

    /// Addresses opened so far, sorted.
    pub fn opened(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock()?.devices.keys().cloned().collect())
    }

    /// Close every open device handle.
    ///
    /// All devices are closed even if some fail; the failures are returned
    /// together as [`Error::Close`].  Devices stay registered and reopen
    /// lazily on their next I/O call.
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.lock()?;
        let mut failures = Vec::new();

        for (address, slot) in &mut state.devices {
            let Some(channel) = slot.channel.take() else {
                continue;
            };
            if let Err(source) = channel.close() {
                warn!("onewire: closing {address} failed: {source}");
                failures.push(CloseFailure {
                    name: address.clone(),
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(failures))
        }
    }
}

impl fmt::Debug for OneWireBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneWireBus")
            .field("id", &self.inner.id)
            .field("devices_dir", &self.inner.devices_dir)
            .finish_non_exhaustive()
    }
}

// ── Internal ──────────────────────────────────────────────────

impl BusInner {
    pub(super) fn lock(&self) -> Result<MutexGuard<'_, BusState>> {
        Ok(self.state.lock()?)
    }

    pub(super) fn fs(&self) -> &dyn PseudoFs {
        self.fs.as_ref()
    }

    /// `<devices>/<address>/rw`
    pub(super) fn rw_path(&self, address: &str) -> PathBuf {
        self.devices_dir.join(address).join("rw")
    }

    fn init(&self, state: &mut BusState) -> Result<()> {
        if state.initialized {
            return Ok(());
        }
        if !self.fs.exists(&self.root) {
            return Err(missing(&self.root));
        }
        info!("onewire: bus {} initialized", self.id);
        state.initialized = true;
        Ok(())
    }
}

impl BusState {
    pub(super) fn slot_mut(&mut self, address: &str) -> Option<&mut Slot> {
        self.devices.get_mut(address)
    }
}

fn missing(path: &Path) -> Error {
    Error::Unavailable {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "w1 subsystem not present"),
    }
}
