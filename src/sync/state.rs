/*!
 * Synchronization State Word
 *
 * One atomic machine word whose meaning belongs entirely to the strategy.
 */

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomic synchronization state
///
/// All accesses are sequentially consistent: a release hook's write must be
/// visible to the next acquirer's read, and the engine pairs state accesses
/// with node status accesses in store-then-load handshakes.
#[derive(Debug, Default)]
#[repr(C, align(64))] // Cache-line aligned, the hottest word of a lock
pub struct StateCell {
    value: AtomicI64,
}

impl StateCell {
    /// Create a state cell with an initial value
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Current value
    #[inline(always)]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Unconditionally replace the value
    #[inline(always)]
    pub fn set(&self, new: i64) {
        self.value.store(new, Ordering::SeqCst);
    }

    /// Atomically replace `expected` with `new`; `true` on success
    #[inline(always)]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
