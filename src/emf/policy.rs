//! Resize policies — how far past a requested size the file actually grows.

use crate::emf::ExfileState;

/// Decides the file's new size given a requested minimum size and the
/// file's current state. Implementations must return a value `>= sz`.
///
/// Grounded on the source's `IWFS_EXT_RSPOLICY` function-pointer collaborator,
/// realized here as a trait object so it composes with closures.
pub trait ResizePolicy: Send + Sync {
    fn resize(&self, requested: u64, state: &ExfileState) -> u64;
}

impl<F> ResizePolicy for F
where
    F: Fn(u64, &ExfileState) -> u64 + Send + Sync,
{
    fn resize(&self, requested: u64, state: &ExfileState) -> u64 {
        self(requested, state)
    }
}

/// Grows the file to exactly the requested size and no further. Mirrors the
/// source's `_exfile_default_spolicy`, which returns `nsize` unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGrowthPolicy;

impl ResizePolicy for NoGrowthPolicy {
    fn resize(&self, requested: u64, _state: &ExfileState) -> u64 {
        requested
    }
}

/// Doubles the current file size whenever growth is required, never growing
/// by less than `min_growth` bytes. Generalizes `velesdb-core`'s
/// `MmapStorage::ensure_capacity` exponential-growth scheme (there applied to
/// one whole-file mapping) into a policy object usable by an arbitrarily
/// sliced extensible file.
#[derive(Debug, Clone, Copy)]
pub struct DoublingPolicy {
    pub min_growth: u64,
}

impl Default for DoublingPolicy {
    fn default() -> Self {
        Self { min_growth: 64 * 1024 * 1024 }
    }
}

impl ResizePolicy for DoublingPolicy {
    fn resize(&self, requested: u64, state: &ExfileState) -> u64 {
        let doubled = state.fsize.saturating_mul(2);
        let grown = state.fsize.saturating_add(self.min_growth);
        requested.max(doubled).max(grown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_fsize(fsize: u64) -> ExfileState {
        ExfileState { fsize, psize: 4096, readonly: false }
    }

    #[test]
    fn no_growth_returns_requested() {
        let p = NoGrowthPolicy;
        assert_eq!(p.resize(12345, &state_with_fsize(4096)), 12345);
    }

    #[test]
    fn doubling_never_shrinks_below_requested() {
        let p = DoublingPolicy::default();
        assert_eq!(p.resize(10, &state_with_fsize(0)), p.min_growth.max(10));
    }

    #[test]
    fn doubling_doubles_once_fsize_is_large() {
        let p = DoublingPolicy { min_growth: 1024 };
        let s = state_with_fsize(1_000_000);
        assert_eq!(p.resize(1_000_001, &s), 2_000_000);
    }

    #[test]
    fn closures_implement_resize_policy() {
        let p = |requested: u64, _: &ExfileState| requested + 7;
        assert_eq!(p.resize(10, &state_with_fsize(0)), 17);
    }
}
