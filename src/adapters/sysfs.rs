//! Real sysfs adapter.
//!
//! Implements [`PseudoFs`] on top of `std::fs`.  This is the only module in
//! the crate that opens actual files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::trace;

use crate::ports::{Access, ByteChannel, PseudoFs};

/// [`PseudoFs`] backed by the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysfsFs;

impl SysfsFs {
    pub fn new() -> Self {
        Self
    }
}

impl PseudoFs for SysfsFs {
    fn open(&self, path: &Path, access: Access) -> io::Result<Box<dyn ByteChannel>> {
        let mut opts = OpenOptions::new();
        match access {
            Access::ReadWrite => opts.read(true).write(true),
            Access::WriteOnly => opts.write(true),
        };
        let file = opts.open(path)?;
        trace!("sysfs: opened {} ({:?})", path.display(), access);
        Ok(Box::new(SysfsFile {
            file,
            path: path.to_path_buf(),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }
}

/// One open sysfs attribute or w1 `rw` file.
#[derive(Debug)]
pub struct SysfsFile {
    file: File,
    path: PathBuf,
}

impl SysfsFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteChannel for SysfsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        // Dropping the File releases the fd.
        trace!("sysfs: closed {}", self.path.display());
        Ok(())
    }
}
