//! Slot key allocation.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared, resettable allocator of slot keys.
///
/// Clones share one register, which is how a [`FieldListManager`] hands
/// every column the same key for a row.
///
/// [`FieldListManager`]: crate::field_list_manager::FieldListManager
///
/// # Examples
///
/// ```
/// use formunit_forms::counter::KeyCounter;
///
/// let counter = KeyCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.reserve(3), 1..4);
/// assert_eq!(counter.current(), 4);
///
/// counter.reset();
/// assert_eq!(counter.next(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyCounter {
    register: Arc<AtomicUsize>,
}

impl KeyCounter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The key the next allocation will return.
    pub fn current(&self) -> usize {
        self.register.load(Ordering::SeqCst)
    }

    /// Advances the register by `delta`.
    pub fn increase(&self, delta: usize) {
        self.register.fetch_add(delta, Ordering::SeqCst);
    }

    /// Returns the current key and advances past it.
    pub fn next(&self) -> usize {
        self.register.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocates `count` consecutive keys.
    pub fn reserve(&self, count: usize) -> Range<usize> {
        let start = self.register.fetch_add(count, Ordering::SeqCst);
        start..start + count
    }

    /// Sets the register back to zero.
    pub fn reset(&self) {
        self.register.store(0, Ordering::SeqCst);
    }

    /// Returns `true` if both handles share one register.
    pub fn shares_register_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.register, &other.register)
    }
}
