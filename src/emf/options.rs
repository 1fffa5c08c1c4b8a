//! Open options for the extensible mapped file.

use crate::emf::policy::ResizePolicy;
use crate::rawfile::OpenMode;
use std::path::PathBuf;
use std::sync::Arc;

/// Options controlling how an [`crate::emf::ExtensibleFile`] is opened.
pub struct ExfileOpts {
    pub path: PathBuf,
    pub omode: OpenMode,
    /// Size the file is truncated/extended to on first open, if nonzero.
    /// Always rounded up to a page boundary.
    pub initial_size: u64,
    /// Policy invoked by `ensure_size` to decide how far past the requested
    /// size the file should actually grow. Defaults to [`crate::emf::policy::NoGrowthPolicy`],
    /// matching the source's `_exfile_default_spolicy`.
    pub rspolicy: Arc<dyn ResizePolicy>,
    /// Whether internal operations take the instance's `RwLock`. Set to
    /// `false` only when the caller already serializes access externally.
    pub use_locks: bool,
}

impl ExfileOpts {
    pub fn new(path: impl Into<PathBuf>, omode: OpenMode) -> Self {
        Self {
            path: path.into(),
            omode,
            initial_size: 0,
            rspolicy: Arc::new(crate::emf::policy::NoGrowthPolicy),
            use_locks: true,
        }
    }

    pub fn with_initial_size(mut self, size: u64) -> Self {
        self.initial_size = size;
        self
    }

    pub fn with_resize_policy(mut self, policy: Arc<dyn ResizePolicy>) -> Self {
        self.rspolicy = policy;
        self
    }

    pub fn without_locks(mut self) -> Self {
        self.use_locks = false;
        self
    }
}
