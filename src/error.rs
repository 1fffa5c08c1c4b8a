//! Crate-wide error type.
//!
//! Every public operation in [`crate::emf`] and [`crate::jsr`] returns
//! [`Result<T>`]. Error codes mirror the boundary contract: callers across a
//! language binding can match on the code without parsing message text.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the extensible mapped file and JSON registry.
#[derive(Error, Debug)]
pub enum Error {
    /// Memory or resource allocation failed.
    #[error("allocation failed")]
    Alloc,

    /// A caller-supplied argument violates the operation's preconditions.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The operation was attempted against a closed or not-yet-open instance.
    #[error("invalid state: instance is closed")]
    InvalidState,

    /// The requested key, path, or file does not exist.
    #[error("not found: {0}")]
    NotExists(String),

    /// A mutating operation was attempted on a read-only instance.
    #[error("instance is read-only")]
    Readonly,

    /// An I/O operation failed without an associated errno.
    #[error("I/O error: {0}")]
    Io(String),

    /// An I/O operation failed, wrapping the originating OS error.
    #[error("I/O error: {0}")]
    IoErrno(#[from] std::io::Error),

    /// A non-I/O OS call failed (e.g. `mmap`/`munmap`), wrapping its errno.
    #[error("OS call failed: {0}")]
    Errno(std::io::Error),

    /// A threading primitive (lock init/acquire) failed.
    #[error("threading error: {0}")]
    ThreadingErrno(String),

    /// A path-based accessor found a value whose stored type cannot convert
    /// to the requested type (e.g. reading an object as a scalar).
    #[error("type not compatible with requested conversion")]
    TypeNotCompatible,

    /// An offset or length is not a multiple of the page size.
    #[error("not aligned to page size")]
    NotAligned,

    /// A computed offset, length, or size falls outside the representable
    /// range, or rounds down to zero.
    #[error("out of bounds")]
    OutOfBounds,

    /// A requested mapping range overlaps an existing slot.
    #[error("mmap region overlaps an existing slot")]
    MmapOverlap,

    /// A slot exists at the given offset but is not currently mapped
    /// (its length is zero because it lies beyond the current file size).
    #[error("region is not mmaped")]
    NotMmaped,

    /// A JSON-pointer path did not resolve to any node.
    #[error("path not found: {0}")]
    PathNotFound(String),
}

impl Error {
    /// Wraps an OS error from a non-I/O syscall (`mmap`, `munmap`, `msync`, …).
    pub(crate) fn errno(e: std::io::Error) -> Self {
        Error::Errno(e)
    }

    /// Wraps a `std::sync`-style poisoning or lock-init failure.
    pub(crate) fn threading(msg: impl Into<String>) -> Self {
        Error::ThreadingErrno(msg.into())
    }
}
