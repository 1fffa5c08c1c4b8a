//! Extensible Mapped File — a single backing file exposed through a set of
//! page-aligned, non-overlapping memory-mapped windows ("slots") that grow
//! and shrink with the file.
//!
//! All state lives behind one `parking_lot::RwLock`, the same "single
//! reader-writer lock serializes every operation" discipline the source uses
//! (and the same one `velesdb-core`'s `MmapStorage` uses around its whole-file
//! `MmapMut`). The difference from `MmapStorage` is that a single file here
//! can carry many independently sized windows rather than one mapping of the
//! entire file.

pub mod options;
pub mod policy;
pub mod slot;

pub use options::ExfileOpts;
pub use policy::{DoublingPolicy, NoGrowthPolicy, ResizePolicy};
pub use slot::{Slot, SlotList};

use crate::error::{Error, Result};
use crate::rawfile::{self, RawFile, RawFileOpts};
use memmap2::MmapOptions;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot of the file's current size and mode. Also the input to
/// [`ResizePolicy::resize`].
#[derive(Debug, Clone, Copy)]
pub struct ExfileState {
    pub fsize: u64,
    pub psize: u64,
    pub readonly: bool,
}

/// Rounds `sz` to a multiple of `psize`: rounds up when that fits in `u64`,
/// otherwise rounds down. Matches spec-level alignment arithmetic used
/// throughout this module so a size request near `u64::MAX` never silently
/// overflows into a tiny value.
pub(crate) fn page_align(sz: u64, psize: u64) -> u64 {
    debug_assert!(psize.is_power_of_two());
    let mask = psize - 1;
    if sz & mask == 0 {
        return sz;
    }
    let rem = sz & mask;
    match sz.checked_add(psize - rem) {
        Some(up) => up,
        None => sz & !mask,
    }
}

/// `true` if `off` is an exact multiple of `psize`.
///
/// The bug this corrects: a naive port of the source would test
/// `off & psize == 0`, which is wrong — the mask must be `psize - 1`.
pub(crate) fn is_aligned(off: u64, psize: u64) -> bool {
    off & (psize - 1) == 0
}

struct Inner {
    raw: RawFile,
    path: PathBuf,
    fsize: u64,
    psize: u64,
    readonly: bool,
    rspolicy: Arc<dyn ResizePolicy>,
    slots: SlotList,
    /// Kept for parity with the source's `use_locks` option. This port always
    /// serializes through the outer `RwLock` regardless, since a slot's
    /// `MmapMut` cannot be reinitialized safely while another thread holds a
    /// reference into it; the flag only documents that the caller asked for
    /// (or waived) external coordination.
    #[allow(dead_code)]
    use_locks: bool,
}

impl Inner {
    fn state(&self) -> ExfileState {
        ExfileState { fsize: self.fsize, psize: self.psize, readonly: self.readonly }
    }

    /// Recomputes every slot's mapped length and (re)creates its `MmapMut`
    /// against the current `fsize`. Mirrors `_exfile_initmmap`/
    /// `_exfile_initmmap_slot`: a slot whose offset now lies at or past the
    /// end of the file maps nothing (`len == 0`); otherwise it maps
    /// `min(maxlen, fsize - off)` bytes.
    fn reinit_mappings(&mut self) -> Result<()> {
        for slot in self.slots.iter_mut() {
            slot.mmap = None;
            let nlen = if slot.off >= self.fsize {
                0
            } else {
                slot.maxlen.min(self.fsize - slot.off)
            };
            slot.len = nlen;
            if nlen > 0 {
                let mmap = unsafe {
                    MmapOptions::new()
                        .offset(slot.off)
                        .len(nlen as usize)
                        .map_mut(self.raw.handle())
                        .map_err(Error::errno)?
                };
                slot.mmap = Some(mmap);
            }
        }
        Ok(())
    }

    /// Resizes the backing file to exactly `new_size` and reinitializes every
    /// slot's mapping. On failure to reinitialize, rolls back to the previous
    /// size and attempts to restore mappings there too, mirroring
    /// `_exfile_truncate_impl`'s rollback-on-failure path.
    fn truncate_to(&mut self, new_size: u64) -> Result<()> {
        if new_size == self.fsize {
            return Ok(());
        }
        let old_size = self.fsize;
        rawfile::ftruncate(self.raw.handle(), new_size)?;
        self.fsize = new_size;
        if let Err(e) = self.reinit_mappings() {
            tracing::error!(error = %e, old_size, new_size, "reinit after truncate failed, rolling back");
            self.fsize = old_size;
            if let Err(rollback_err) = rawfile::ftruncate(self.raw.handle(), old_size) {
                tracing::error!(error = %rollback_err, "rollback truncate also failed");
                return Err(rollback_err);
            }
            self.reinit_mappings()?;
            return Err(e);
        }
        Ok(())
    }
}

/// A single backing file exposed as a set of independently sized mmap
/// windows, with automatic growth and page alignment.
pub struct ExtensibleFile {
    inner: RwLock<Inner>,
}

impl ExtensibleFile {
    /// Opens (and creates, if requested) the file described by `opts`.
    pub fn open(opts: ExfileOpts) -> Result<Self> {
        let psize = rawfile::page_size();
        let readonly = !opts.omode.write;
        let raw = RawFile::open(&RawFileOpts::new(opts.path.clone(), opts.omode))?;
        let mut fsize = raw.state()?.size;

        if opts.initial_size > 0 {
            let target = page_align(opts.initial_size, psize);
            if target > fsize {
                rawfile::ftruncate(raw.handle(), target)?;
                fsize = target;
            }
        } else if !is_aligned(fsize, psize) {
            let aligned = fsize & !(psize - 1);
            rawfile::ftruncate(raw.handle(), aligned)?;
            fsize = aligned;
        }

        tracing::debug!(path = %opts.path.display(), fsize, psize, "opened extensible file");

        Ok(Self {
            inner: RwLock::new(Inner {
                raw,
                path: opts.path,
                fsize,
                psize,
                readonly,
                rspolicy: opts.rspolicy,
                slots: SlotList::new(),
                use_locks: opts.use_locks,
            }),
        })
    }

    /// Flushes every mapping and the file itself, consuming the handle.
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    pub fn state(&self) -> Result<ExfileState> {
        Ok(self.inner.read().state())
    }

    pub fn path(&self) -> PathBuf {
        self.inner.read().path.clone()
    }

    /// Grows the file, if necessary, so that it is at least `sz` bytes long.
    /// The resize policy decides how far past `sz` to actually grow; the
    /// result is page-aligned before being applied.
    ///
    /// The source's `_exfile_ensure_size`/`_exfile_ensure_size_impl` never
    /// actually resized anything — they computed a size under the read lock
    /// and returned without applying it. This is the completed version of
    /// that operation.
    pub fn ensure_size(&self, sz: u64) -> Result<()> {
        {
            let guard = self.inner.read();
            if guard.fsize >= sz {
                return Ok(());
            }
            if guard.readonly {
                return Err(Error::Readonly);
            }
        }
        let mut guard = self.inner.write();
        if guard.fsize >= sz {
            return Ok(());
        }
        if guard.readonly {
            return Err(Error::Readonly);
        }
        let state = guard.state();
        let requested = guard.rspolicy.resize(sz, &state);
        let aligned = page_align(requested.max(sz), guard.psize);
        if aligned < sz {
            return Err(Error::OutOfBounds);
        }
        guard.truncate_to(aligned)
    }

    /// Sets the file's size to `sz`, rounded up to a page boundary (rounded
    /// down only if rounding up would overflow `u64`). Shrinking unmaps any
    /// bytes past the new end; growing maps newly available bytes into slots
    /// whose window extends that far.
    pub fn truncate(&self, sz: u64) -> Result<()> {
        let mut guard = self.inner.write();
        if guard.readonly {
            return Err(Error::Readonly);
        }
        let aligned = page_align(sz, guard.psize);
        guard.truncate_to(aligned)
    }

    /// Registers a new mapped window starting at `off`. `off` must be
    /// page-aligned and must not overlap any existing slot. `maxlen` is
    /// saturated so `off + maxlen` never exceeds `u64::MAX`, then rounded to
    /// a multiple of the page size (rounded down only if rounding up would
    /// push it back past that saturation bound); if the result is zero, the
    /// window is entirely out of bounds.
    pub fn add_mmap(&self, off: u64, maxlen: u64) -> Result<()> {
        if maxlen == 0 {
            return Err(Error::InvalidArgs("maxlen must be nonzero".into()));
        }
        let mut guard = self.inner.write();
        if guard.readonly {
            return Err(Error::Readonly);
        }
        if !is_aligned(off, guard.psize) {
            return Err(Error::NotAligned);
        }
        let max_allowed = u64::MAX - off;
        let saturated = maxlen.min(max_allowed);
        let mut aligned_maxlen = page_align(saturated, guard.psize);
        if aligned_maxlen > max_allowed {
            aligned_maxlen = saturated & !(guard.psize - 1);
        }
        if aligned_maxlen == 0 {
            return Err(Error::OutOfBounds);
        }
        guard.slots.add(off, aligned_maxlen)?;
        let fsize = guard.fsize;
        let nlen = if off >= fsize { 0 } else { aligned_maxlen.min(fsize - off) };
        guard.slots.get_mut(off).expect("just inserted").len = nlen;
        if nlen > 0 {
            let mmap = unsafe {
                MmapOptions::new()
                    .offset(off)
                    .len(nlen as usize)
                    .map_mut(guard.raw.handle())
                    .map_err(Error::errno)?
            };
            guard.slots.get_mut(off).expect("just inserted").mmap = Some(mmap);
        }
        tracing::debug!(off, maxlen = aligned_maxlen, "added mmap slot");
        Ok(())
    }

    /// Borrows the live window at `off` for read-only byte access, under the
    /// instance's read lock — concurrent readers of disjoint slots do not
    /// serialize against each other. Errors with `NotExists` if no slot
    /// starts there, or `NotMmaped` if the slot exists but currently maps
    /// nothing (its offset lies past the file's end).
    pub fn get_mmap(&self, off: u64) -> Result<MmapGuard<'_>> {
        let guard = self.inner.read();
        match guard.slots.get(off) {
            None => Err(Error::NotExists(format!("no slot at offset {off}"))),
            Some(slot) if slot.mmap.is_none() => Err(Error::NotMmaped),
            Some(_) => Ok(MmapGuard { guard, off }),
        }
    }

    /// Borrows the live window at `off` for mutable byte access, under the
    /// instance's write lock. Same error cases as [`Self::get_mmap`].
    pub fn get_mmap_mut(&self, off: u64) -> Result<MmapGuardMut<'_>> {
        let guard = self.inner.write();
        match guard.slots.get(off) {
            None => Err(Error::NotExists(format!("no slot at offset {off}"))),
            Some(slot) if slot.mmap.is_none() => Err(Error::NotMmaped),
            Some(_) => Ok(MmapGuardMut { guard, off }),
        }
    }

    /// Unregisters the slot at `off`, unmapping it.
    pub fn remove_mmap(&self, off: u64) -> Result<()> {
        let mut guard = self.inner.write();
        guard.slots.remove(off)?;
        tracing::debug!(off, "removed mmap slot");
        Ok(())
    }

    /// Flushes the slot at `off` to disk. Returns `NotMmaped` both when no
    /// slot starts at `off` and when it exists but is currently unmapped —
    /// matching `_exfile_sync_mmap`'s single post-loop "didn't find it" check.
    pub fn sync_mmap(&self, off: u64, flags: SyncFlags) -> Result<()> {
        let guard = self.inner.read();
        match guard.slots.get(off).and_then(|s| s.mmap.as_ref()) {
            Some(mmap) => match flags {
                SyncFlags::Async => mmap.flush_async().map_err(Error::errno),
                SyncFlags::Sync => mmap.flush().map_err(Error::errno),
            },
            None => Err(Error::NotMmaped),
        }
    }

    /// Reads directly from the backing file at `off`, bypassing any mmap
    /// window.
    pub fn read(&self, off: u64, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.inner.write();
        guard.raw.read(off, buf)
    }

    /// Writes directly to the backing file at `off`, bypassing any mmap
    /// window. Does not grow the file — call [`Self::ensure_size`] first.
    pub fn write(&self, off: u64, buf: &[u8]) -> Result<usize> {
        let mut guard = self.inner.write();
        if guard.readonly {
            return Err(Error::Readonly);
        }
        guard.raw.write(off, buf)
    }

    /// Flushes every mapped slot and the underlying file.
    pub fn sync(&self) -> Result<()> {
        let mut guard = self.inner.write();
        for slot in guard.slots.iter() {
            if let Some(mmap) = &slot.mmap {
                mmap.flush().map_err(Error::errno)?;
            }
        }
        guard.raw.sync()
    }
}

/// Whether [`ExtensibleFile::sync_mmap`] blocks until the flush lands
/// (`Sync`, `msync`'s `MS_SYNC`) or merely schedules it (`Async`, `MS_ASYNC`
/// — the default, matching the source's documented default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncFlags {
    #[default]
    Async,
    Sync,
}

/// A read-locked view onto a single mapped window, obtained from
/// [`ExtensibleFile::get_mmap`].
///
/// Grounded on `velesdb-core`'s `VectorSliceGuard`: both hand out a byte
/// slice backed by a live lock guard rather than an escaping raw pointer, so
/// the borrow checker keeps the mapping from being reinitialized out from
/// under the caller.
pub struct MmapGuard<'a> {
    guard: RwLockReadGuard<'a, Inner>,
    off: u64,
}

impl<'a> MmapGuard<'a> {
    pub fn as_slice(&self) -> &[u8] {
        self.guard
            .slots
            .get(self.off)
            .and_then(|s| s.mmap.as_deref())
            .unwrap_or(&[])
    }
}

/// A write-locked view onto a single mapped window, obtained from
/// [`ExtensibleFile::get_mmap_mut`].
pub struct MmapGuardMut<'a> {
    guard: RwLockWriteGuard<'a, Inner>,
    off: u64,
}

impl<'a> MmapGuardMut<'a> {
    pub fn as_slice(&self) -> &[u8] {
        self.guard
            .slots
            .get(self.off)
            .and_then(|s| s.mmap.as_deref())
            .unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.guard
            .slots
            .get_mut(self.off)
            .and_then(|s| s.mmap.as_deref_mut())
            .unwrap_or(&mut [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rawfile::OpenMode;
    use tempfile::tempdir;

    fn opts(path: std::path::PathBuf) -> ExfileOpts {
        ExfileOpts::new(path, OpenMode::create_read_write())
    }

    #[test]
    fn open_creates_file_and_aligns_initial_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path).with_initial_size(1)).unwrap();
        assert_eq!(ef.state().unwrap().fsize, psize);
    }

    #[test]
    fn ensure_size_grows_file_to_requested_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        ef.ensure_size(1).unwrap();
        assert_eq!(ef.state().unwrap().fsize, psize);
        ef.ensure_size(psize * 3 + 1).unwrap();
        assert_eq!(ef.state().unwrap().fsize, psize * 4);
    }

    #[test]
    fn ensure_size_is_idempotent_and_never_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        ef.ensure_size(psize * 2).unwrap();
        ef.ensure_size(1).unwrap();
        assert_eq!(ef.state().unwrap().fsize, psize * 2);
    }

    #[test]
    fn add_mmap_rejects_unaligned_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        let err = ef.add_mmap(1, 4096).unwrap_err();
        assert!(matches!(err, Error::NotAligned));
    }

    #[test]
    fn add_mmap_past_eof_maps_nothing_until_grown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        ef.add_mmap(psize, psize).unwrap();
        assert!(matches!(ef.get_mmap(psize).unwrap_err(), Error::NotMmaped));

        ef.ensure_size(psize * 2).unwrap();
        let guard = ef.get_mmap(psize).unwrap();
        assert_eq!(guard.as_slice().len(), psize as usize);
    }

    #[test]
    fn add_mmap_rounds_unaligned_maxlen_up_to_a_full_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path).with_initial_size(psize)).unwrap();
        // `maxlen` of 1 byte rounds up to a whole page rather than mapping
        // (and being stored as) an unaligned 1-byte window.
        ef.add_mmap(0, 1).unwrap();
        let guard = ef.get_mmap(0).unwrap();
        assert_eq!(guard.as_slice().len(), psize as usize);
    }

    #[test]
    fn add_mmap_rejects_window_that_saturates_to_zero_out_of_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        // Less than one page of offset space remains before `u64::MAX`, so
        // any requested window saturates and then aligns down to zero.
        let off = (u64::MAX - psize / 2) & !(psize - 1);
        let err = ef.add_mmap(off, psize).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds));
    }

    #[test]
    fn write_then_read_through_mmap_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path).with_initial_size(psize)).unwrap();
        ef.add_mmap(0, psize).unwrap();
        {
            let mut guard = ef.get_mmap_mut(0).unwrap();
            guard.as_mut_slice()[0..5].copy_from_slice(b"hello");
        }
        ef.sync_mmap(0, SyncFlags::Sync).unwrap();
        let guard = ef.get_mmap(0).unwrap();
        assert_eq!(&guard.as_slice()[0..5], b"hello");
    }

    #[test]
    fn remove_mmap_then_sync_mmap_reports_not_mmaped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path).with_initial_size(psize)).unwrap();
        ef.add_mmap(0, psize).unwrap();
        ef.remove_mmap(0).unwrap();
        assert!(matches!(ef.sync_mmap(0, SyncFlags::default()).unwrap_err(), Error::NotMmaped));
    }

    #[test]
    fn truncate_rounds_size_up_to_page_boundary_instead_of_rejecting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path)).unwrap();
        ef.truncate(1).unwrap();
        assert_eq!(ef.state().unwrap().fsize, psize);
    }

    #[test]
    fn direct_read_write_bypasses_mmap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.exf");
        let psize = rawfile::page_size();
        let ef = ExtensibleFile::open(opts(path).with_initial_size(psize)).unwrap();
        ef.write(10, b"abc").unwrap();
        let mut buf = [0u8; 3];
        ef.read(10, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn page_align_rounds_up_unless_it_would_overflow() {
        assert_eq!(page_align(0, 4096), 0);
        assert_eq!(page_align(1, 4096), 4096);
        assert_eq!(page_align(4096, 4096), 4096);
        assert_eq!(page_align(u64::MAX, 4096), u64::MAX & !4095);
    }

    #[test]
    fn is_aligned_uses_mask_not_raw_psize() {
        assert!(is_aligned(0, 4096));
        assert!(is_aligned(4096, 4096));
        assert!(!is_aligned(4095, 4096));
        // Regression guard for the `off & psize` bug: 8192 & 4096 == 0, which
        // would wrongly look aligned under the buggy test even though our
        // correct test also happens to call it aligned here (8192 is a
        // multiple of 4096) — the meaningful case is 4095 above.
        assert!(is_aligned(8192, 4096));
    }
}
