//! Named advisory flags for scripts that coordinate across calls.
//!
//! The engine never takes these itself; they are plain test-and-set bits.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// A fixed set of advisory lock flags addressed by index.
#[derive(Debug)]
pub struct AdvisoryLocks {
    flags: Vec<AtomicBool>,
}

impl AdvisoryLocks {
    /// Create `count` released flags.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            flags: (0..count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn flag(&self, index: i32) -> Option<&AtomicBool> {
        let flag = usize::try_from(index).ok().and_then(|i| self.flags.get(i));
        if flag.is_none() {
            warn!(index, count = self.flags.len(), "Advisory lock index out of range");
        }
        flag
    }

    /// Acquire flag `index` if it is free. An invalid index is never
    /// acquired.
    pub fn try_lock(&self, index: i32) -> bool {
        self.flag(index).is_some_and(|flag| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Release flag `index`. Releasing a free flag or an invalid index does
    /// nothing.
    pub fn unlock(&self, index: i32) {
        if let Some(flag) = self.flag(index) {
            flag.store(false, Ordering::Release);
        }
    }

    /// Whether flag `index` is currently held.
    #[must_use]
    pub fn is_locked(&self, index: i32) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.flags.get(i))
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Release every flag.
    pub fn clear_all(&self) {
        for flag in &self.flags {
            flag.store(false, Ordering::Release);
        }
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether there are no flags at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_until_released() {
        let locks = AdvisoryLocks::new(3);
        assert!(locks.try_lock(1));
        assert!(!locks.try_lock(1));
        assert!(locks.is_locked(1));
        locks.unlock(1);
        assert!(locks.try_lock(1));
    }

    #[test]
    fn invalid_index_never_locks() {
        let locks = AdvisoryLocks::new(3);
        assert!(!locks.try_lock(-1));
        assert!(!locks.try_lock(3));
        locks.unlock(7);
        assert!(!locks.is_locked(3));
    }

    #[test]
    fn clear_all_releases_everything() {
        let locks = AdvisoryLocks::new(3);
        for i in 0..3 {
            assert!(locks.try_lock(i));
        }
        locks.clear_all();
        assert!((0..3).all(|i| !locks.is_locked(i)));
    }
}
