//! In-memory pseudo-filesystem for integration tests.
//!
//! Every file is a factory producing a fresh [`ByteChannel`] on each open, so
//! tests can count opens and share state (probes, simulated devices) between
//! the channel and the assertions.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rpi_periph::config::HostConfig;
use rpi_periph::ports::{Access, ByteChannel, PseudoFs};

pub type Factory = Arc<dyn Fn() -> Box<dyn ByteChannel> + Send + Sync>;

// ── MemFs ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemFs {
    dirs: Mutex<BTreeSet<PathBuf>>,
    files: Mutex<HashMap<PathBuf, Factory>>,
    opens: Mutex<Vec<(PathBuf, Access)>>,
}

#[allow(dead_code)]
impl MemFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a directory and all of its ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut dirs = self.dirs.lock().unwrap();
        for ancestor in path.as_ref().ancestors() {
            dirs.insert(ancestor.to_path_buf());
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, factory: Factory) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), factory);
    }

    /// A file whose channels all share `probe`.
    pub fn add_probe(&self, path: impl AsRef<Path>, probe: &Arc<Probe>) {
        let probe = Arc::clone(probe);
        self.add_file(
            path,
            Arc::new(move || Box::new(ProbeChannel(Arc::clone(&probe))) as Box<dyn ByteChannel>),
        );
    }

    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path.as_ref())
            .count()
    }

    pub fn total_opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn last_access(&self, path: impl AsRef<Path>) -> Option<Access> {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == path.as_ref())
            .map(|(_, a)| *a)
    }
}

impl PseudoFs for MemFs {
    fn open(&self, path: &Path, access: Access) -> io::Result<Box<dyn ByteChannel>> {
        let factory = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        self.opens
            .lock()
            .unwrap()
            .push((path.to_path_buf(), access));
        Ok(factory())
    }

    fn exists(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path) || self.files.lock().unwrap().contains_key(path)
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let dirs = self.dirs.lock().unwrap();
        if !dirs.contains(dir) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        let files = self.files.lock().unwrap();
        let names: BTreeSet<String> = dirs
            .iter()
            .chain(files.keys())
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        Ok(names.into_iter().collect())
    }
}

// ── Layout helpers ────────────────────────────────────────────

/// `/sys/bus/w1/devices/<address>/rw` under the default config.
pub fn rw_path(address: &str) -> PathBuf {
    HostConfig::default()
        .w1_devices_dir
        .join(address)
        .join("rw")
}

/// An empty but present w1 subsystem (bus master entry only).
pub fn w1_fs() -> Arc<MemFs> {
    let fs = MemFs::new();
    let config = HostConfig::default();
    fs.add_dir(config.w1_devices_dir.join("w1_bus_master1"));
    fs
}

// ── Probe channel ─────────────────────────────────────────────

/// Shared record of everything done to a file, plus failure switches.
#[derive(Default)]
pub struct Probe {
    /// Every successful write, one entry per call.
    pub writes: Mutex<Vec<Vec<u8>>>,
    /// Bytes handed out by `read`.
    pub rx: Mutex<VecDeque<u8>>,
    /// Writes are also queued to `rx`.
    pub loopback: AtomicBool,
    pub closes: AtomicUsize,
    pub fail_write: AtomicBool,
    pub short_write: AtomicBool,
    pub fail_read: AtomicBool,
    pub fail_close: AtomicBool,
}

#[allow(dead_code)]
impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loopback() -> Arc<Self> {
        let probe = Self::default();
        probe.loopback.store(true, Ordering::SeqCst);
        Arc::new(probe)
    }

    pub fn writes_as_text(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.writes_as_text().pop()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn queue(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }
}

pub struct ProbeChannel(pub Arc<Probe>);

impl ByteChannel for ProbeChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.fail_read.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected read failure"));
        }
        let mut rx = self.0.rx.lock().unwrap();
        let n = buf.len().min(rx.len());
        for slot in &mut buf[..n] {
            *slot = rx.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.0.fail_write.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        if self.0.short_write.load(Ordering::SeqCst) {
            return Ok(0);
        }
        self.0.writes.lock().unwrap().push(buf.to_vec());
        if self.0.loopback.load(Ordering::SeqCst) {
            self.0.queue(buf);
        }
        Ok(buf.len())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected close failure"));
        }
        Ok(())
    }
}

// ── Overlap detector ──────────────────────────────────────────

/// Counts how many channel calls are in progress at once, across every
/// channel sharing the detector.
#[derive(Default)]
pub struct Overlap {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl Overlap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_micros(200));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn factory(self: &Arc<Self>) -> Factory {
        let overlap = Arc::clone(self);
        Arc::new(move || Box::new(OverlapChannel(Arc::clone(&overlap))) as Box<dyn ByteChannel>)
    }
}

pub struct OverlapChannel(Arc<Overlap>);

impl ByteChannel for OverlapChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.enter();
        buf.fill(0x01);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.enter();
        Ok(buf.len())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

// ── Simulated DS18B20 ─────────────────────────────────────────

/// Device-side state of a simulated DS18B20 behind a `rw` file.
pub struct SimState {
    /// Current register block; byte 8 is kept consistent by `set_scratchpad`.
    pub scratchpad: [u8; 9],
    /// Zero bytes answered to polls after each Convert T.
    pub busy_polls: u32,
    /// Flip a bit in the CRC byte of every scratchpad read.
    pub corrupt_crc: bool,
    /// Index of the write call that fails, counted from the first write.
    pub fail_write_at: Option<usize>,
    pub fail_reads: bool,
    /// Bytes successfully written, in order.
    pub written: Vec<u8>,
    pub polls: usize,
    converting: Option<u32>,
    pending: VecDeque<u8>,
    write_scratchpad_left: usize,
    write_calls: usize,
}

pub type Sim = Arc<Mutex<SimState>>;

/// 25 °C at 12-bit resolution.
pub const ROOM: [u8; 9] = [0x90, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x10, 0x10, 0x92];

#[allow(dead_code)]
impl SimState {
    pub fn new(scratchpad: [u8; 9]) -> Sim {
        Arc::new(Mutex::new(Self {
            scratchpad,
            busy_polls: 0,
            corrupt_crc: false,
            fail_write_at: None,
            fail_reads: false,
            written: Vec::new(),
            polls: 0,
            converting: None,
            pending: VecDeque::new(),
            write_scratchpad_left: 0,
            write_calls: 0,
        }))
    }

    /// Replace bytes 0..8 and recompute the CRC.
    pub fn set_scratchpad(&mut self, data: [u8; 8]) {
        self.scratchpad[..8].copy_from_slice(&data);
        self.scratchpad[8] = rpi_periph::sensors::ds18b20::crc8(&data);
    }

    pub fn set_temperature_raw(&mut self, raw: i16) {
        let mut data = [0u8; 8];
        data.copy_from_slice(&self.scratchpad[..8]);
        data[..2].copy_from_slice(&raw.to_le_bytes());
        self.set_scratchpad(data);
    }

    fn on_write(&mut self, byte: u8) {
        if self.write_scratchpad_left > 0 {
            // TH, TL, configuration
            let index = 2 + (3 - self.write_scratchpad_left);
            self.write_scratchpad_left -= 1;
            let mut data = [0u8; 8];
            data.copy_from_slice(&self.scratchpad[..8]);
            data[index] = byte;
            self.set_scratchpad(data);
            return;
        }
        match byte {
            0x44 => {
                self.pending.clear();
                self.converting = Some(self.busy_polls);
            }
            0xBE => {
                self.pending = self.scratchpad.iter().copied().collect();
                if self.corrupt_crc {
                    if let Some(crc) = self.pending.back_mut() {
                        *crc ^= 0x01;
                    }
                }
            }
            0x4E => self.write_scratchpad_left = 3,
            _ => {}
        }
    }
}

pub fn sim_factory(sim: &Sim) -> Factory {
    let sim = Arc::clone(sim);
    Arc::new(move || Box::new(SimChannel(Arc::clone(&sim))) as Box<dyn ByteChannel>)
}

pub struct SimChannel(Sim);

impl ByteChannel for SimChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut sim = self.0.lock().unwrap();
        if sim.fail_reads {
            return Err(io::Error::other("injected read failure"));
        }
        if let Some(left) = sim.converting {
            sim.polls += 1;
            if let Some(first) = buf.first_mut() {
                if left == 0 {
                    *first = 0xFF;
                    sim.converting = None;
                } else {
                    *first = 0x00;
                    sim.converting = Some(left - 1);
                }
            }
            return Ok(buf.len().min(1));
        }
        if sim.pending.is_empty() {
            // Idle bus reads as ones.
            buf.fill(0xFF);
            return Ok(buf.len());
        }
        let n = buf.len().min(sim.pending.len());
        for slot in &mut buf[..n] {
            *slot = sim.pending.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sim = self.0.lock().unwrap();
        let call = sim.write_calls;
        sim.write_calls += 1;
        if sim.fail_write_at == Some(call) {
            return Err(io::Error::other("injected write failure"));
        }
        for &byte in buf {
            sim.written.push(byte);
            sim.on_write(byte);
        }
        Ok(buf.len())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
