//! The raw-file collaborator.
//!
//! Out of scope per the design this crate follows (§6): the extensible mapped
//! file is built *on top of* random-access file primitives, not responsible
//! for them. This module is the minimal concrete implementation of that
//! contract — open/close/read/write/sync/state plus the free functions
//! `ftruncate`, `fstat`, `page_size` — so the crate is buildable standalone.
//! [`crate::emf::ExtensibleFile`] depends only on this narrow surface, which
//! keeps the door open for a test double.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open-mode flags. Mirrors the source's `iwfs_omode`, spelled out as plain
/// booleans rather than a bitset crate since the original's bit values carry
/// no on-disk meaning of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenMode {
    pub const fn read_only() -> Self {
        Self { read: true, write: false, create: false, truncate: false }
    }

    pub const fn read_write() -> Self {
        Self { read: true, write: true, create: false, truncate: false }
    }

    pub const fn create_read_write() -> Self {
        Self { read: true, write: true, create: true, truncate: false }
    }
}

/// Options used to open a [`RawFile`].
#[derive(Clone, Debug)]
pub struct RawFileOpts {
    pub path: PathBuf,
    pub omode: OpenMode,
}

impl RawFileOpts {
    pub fn new(path: impl Into<PathBuf>, omode: OpenMode) -> Self {
        Self { path: path.into(), omode }
    }
}

/// Snapshot of a raw file's current state.
#[derive(Clone, Debug)]
pub struct RawFileState {
    pub path: PathBuf,
    pub open_mode: OpenMode,
    pub size: u64,
}

/// A plain random-access file, opened per [`RawFileOpts`].
///
/// Every mutating call serializes internally is *not* provided here — the
/// caller (EMF) is responsible for any locking. `RawFile` itself has no
/// concurrency story beyond what `std::fs::File` gives for free.
pub struct RawFile {
    file: File,
    state: RawFileState,
}

impl RawFile {
    /// Opens (creating if requested) the file described by `opts`.
    pub fn open(opts: &RawFileOpts) -> Result<Self> {
        let mut oo = OpenOptions::new();
        oo.read(opts.omode.read)
            .write(opts.omode.write)
            .create(opts.omode.create)
            .truncate(opts.omode.truncate);
        let file = oo.open(&opts.path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            state: RawFileState { path: opts.path.clone(), open_mode: opts.omode, size },
        })
    }

    pub fn close(self) -> Result<()> {
        // Dropping `self.file` closes the descriptor; nothing else to release.
        Ok(())
    }

    pub fn read(&mut self, off: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(off))?;
        let n = self.file.read(buf)?;
        Ok(n)
    }

    pub fn write(&mut self, off: u64, buf: &[u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(off))?;
        let n = self.file.write(buf)?;
        if off + n as u64 > self.state.size {
            self.state.size = off + n as u64;
        }
        Ok(n)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn state(&self) -> Result<RawFileState> {
        Ok(self.state.clone())
    }

    pub(crate) fn handle(&self) -> &File {
        &self.file
    }
}

/// Resizes the file at `path` (already-open handle) to exactly `size` bytes.
pub fn ftruncate(file: &File, size: u64) -> Result<()> {
    file.set_len(size)?;
    Ok(())
}

/// Stats the file at `path`, returning its size in bytes.
pub fn fstat(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path).map(|m| m.len()).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotExists(path.display().to_string())
        } else {
            Error::IoErrno(e)
        }
    })?)
}

/// The system's memory-page granularity.
pub fn page_size() -> u64 {
    page_size::get() as u64
}
