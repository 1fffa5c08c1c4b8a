//! Extensible Mapped File and JSON Registry — low-level file-storage
//! support primitives: a single backing file exposed as a set of
//! page-aligned mmap windows that grow and shrink safely, and a persistent
//! JSON object tree with path-based accessors and atomic-replace sync.

pub mod emf;
pub mod error;
pub mod jsr;
pub mod rawfile;

pub use emf::{
    DoublingPolicy, ExfileOpts, ExfileState, ExtensibleFile, MmapGuard, MmapGuardMut,
    NoGrowthPolicy, ResizePolicy, Slot, SyncFlags,
};
pub use error::{Error, Result};
pub use jsr::{Format, JsonRegistry, JsrOpts, LockAdapter};
pub use rawfile::{OpenMode, RawFile, RawFileOpts, RawFileState};
