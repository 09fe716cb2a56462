use core::sync::atomic::{AtomicUsize, Ordering};

use self::GuardState::{Locked, Unlocked};

/// Locked with an empty waiter queue (a `null` queue head).
const LOCKED: usize = 0;
/// No node of a waiter queue can be located at this (unaligned) address.
const UNLOCKED: usize = 1;

////////////////////////////////////////////////////////////////////////////////////////////////////
// AtomicGuardState (public but not exported)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The concurrently and atomically mutable mutual exclusion guard of a
/// [`SingletonCell`](crate::doc::SingletonCell).
///
/// Any value other than `UNLOCKED` means the guard is held and is at the
/// same time interpreted as the head pointer of a [`WaiterQueue`] of blocked
/// threads.
/// A `LOCKED` value is a `null` pointer, i.e. the guard is held but nobody is
/// queued up.
#[derive(Debug)]
pub struct AtomicGuardState(AtomicUsize);

/********** impl inherent *************************************************************************/

impl AtomicGuardState {
    /// Creates a new `UNLOCKED` guard.
    #[inline]
    pub(crate) const fn new() -> Self {
        Self(AtomicUsize::new(UNLOCKED))
    }

    /// Loads the current state using `order`.
    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> GuardState {
        self.0.load(order).into()
    }

    /// Attempts to take the guard and returns the current waiter queue if it
    /// is already held by some other caller.
    #[inline]
    pub(crate) fn try_lock(&self, success: Ordering) -> Result<(), WaiterQueue> {
        match self.0.compare_exchange(UNLOCKED, LOCKED, success, Ordering::Relaxed) {
            Ok(_) => Ok(()),
            // a strong CAS can only fail if the value differs from `UNLOCKED`
            Err(queue) => Err(WaiterQueue { head: queue as *const () }),
        }
    }

    /// Attempts to compare-and-swap the head of the `current` [`WaiterQueue`]
    /// with the `new` queue.
    ///
    /// Fails with the actual state, if the guard has been released in the
    /// meantime or another waiter has been enqueued first.
    #[cfg(feature = "std")]
    #[inline]
    pub(crate) fn try_swap_waiters(
        &self,
        current: WaiterQueue,
        new: WaiterQueue,
        success: Ordering,
    ) -> Result<(), GuardState> {
        match self.0.compare_exchange(current.into(), new.into(), success, Ordering::Acquire) {
            Ok(_) => Ok(()),
            Err(prev) => Err(prev.into()),
        }
    }

    /// Unconditionally releases the guard and returns the queue of threads
    /// that blocked while it was held.
    #[inline]
    pub(crate) fn unlock(&self, order: Ordering) -> WaiterQueue {
        WaiterQueue { head: self.0.swap(UNLOCKED, order) as *const () }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// GuardState
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum GuardState {
    /// The guard is free to be taken.
    Unlocked,
    /// The guard is held, possibly with a queue of waiting threads.
    Locked(WaiterQueue),
}

/********** impl From (usize) *********************************************************************/

impl From<usize> for GuardState {
    #[inline]
    fn from(state: usize) -> Self {
        match state {
            UNLOCKED => Unlocked,
            queue => Locked(WaiterQueue { head: queue as *const () }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// WaiterQueue (public but not exported)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The (possibly empty) intrusive list of threads waiting for the guard.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WaiterQueue {
    pub(crate) head: *const (),
}

/********** impl inherent *************************************************************************/

impl WaiterQueue {
    /// Returns `true` if no thread is queued up.
    #[inline]
    pub(crate) fn is_empty(self) -> bool {
        self.head.is_null()
    }
}

/********** impl From (for usize) *****************************************************************/

impl From<WaiterQueue> for usize {
    #[inline]
    fn from(queue: WaiterQueue) -> Self {
        queue.head as usize
    }
}
