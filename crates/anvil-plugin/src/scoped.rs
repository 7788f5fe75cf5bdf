//! Save/restore guards for per-thread state.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread::LocalKey;

/// Replaces a thread-local slot for the lifetime of the guard.
///
/// The previous value is put back on drop, including during unwinding.
/// The guard cannot leave the thread that created it.
pub(crate) struct ScopedRestore<T: 'static> {
    slot: &'static LocalKey<RefCell<Option<T>>>,
    previous: Option<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: 'static> ScopedRestore<T> {
    /// Install `value` into `slot`, remembering what was there.
    pub(crate) fn replace(slot: &'static LocalKey<RefCell<Option<T>>>, value: Option<T>) -> Self {
        let previous = slot.with(|cell| cell.replace(value));
        Self {
            slot,
            previous,
            _not_send: PhantomData,
        }
    }
}

impl<T: 'static> Drop for ScopedRestore<T> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The slot may already be gone during thread teardown.
        let _ = self.slot.try_with(|cell| {
            cell.replace(previous);
        });
    }
}

/// Read a thread-local slot.
pub(crate) fn current<T: Clone + 'static>(slot: &'static LocalKey<RefCell<Option<T>>>) -> Option<T> {
    slot.with(|cell| cell.borrow().clone())
}
