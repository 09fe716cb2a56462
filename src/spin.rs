//! Singleton primitives that use spin-locks in case of concurrent accesses
//! under contention.

use core::sync::atomic::Ordering;

use conquer_util::BackOff;

use crate::cell::{Block, Unblock};
use crate::state::{AtomicGuardState, GuardState, WaiterQueue};
use crate::Internal;

use self::internal::Spin;

/// A holder for a lazily constructed resource and the routine constructing
/// it, which spins while its guard is held by another caller.
///
/// This type is `#[no_std]` compatible.
///
/// For the API of this type alias, see the generic
/// [`Singleton`](crate::doc::Singleton) type.
pub type Singleton<T, F = fn() -> T> = crate::singleton::Singleton<T, Spin, F>;

/// A holder for a lazily constructed resource and a fallible routine
/// constructing it, which spins while its guard is held by another caller.
///
/// This type is `#[no_std]` compatible.
///
/// For the API of this type alias, see the generic
/// [`FallibleSingleton`](crate::doc::FallibleSingleton) type.
pub type FallibleSingleton<T, E, F = fn() -> Result<T, E>> =
    crate::singleton::FallibleSingleton<T, E, Spin, F>;

/// An interior mutability cell which constructs its resource exactly once,
/// spinning while its guard is held by another caller.
///
/// This type is `#[no_std]` compatible.
///
/// For the API of this type alias, see the generic
/// [`SingletonCell`](crate::doc::SingletonCell) type.
pub type SingletonCell<T> = crate::cell::SingletonCell<T, Spin>;

mod internal {
    /// Blocking strategy using a spin-lock with exponential back-off.
    #[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Spin;
}

/********** impl Internal *************************************************************************/

impl Internal for Spin {}

/********** impl Unblock **************************************************************************/

impl Unblock for Spin {
    #[inline(always)]
    unsafe fn on_unblock(queue: WaiterQueue) {
        // spinning threads never enqueue themselves
        debug_assert!(queue.is_empty());
    }
}

/********** impl Block ****************************************************************************/

impl Block for Spin {
    #[inline]
    fn block(state: &AtomicGuardState) {
        let backoff = BackOff::new();
        // the subsequent acquire CAS (lock:1) provides the required synchronization
        while let GuardState::Locked(_) = state.load(Ordering::Relaxed) {
            backoff.spin();
        }
    }
}
