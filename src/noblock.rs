//! Singleton primitives that permit only non-blocking synchronized
//! operations.
//!
//! A caller finding the guard held by another caller gets an error instead of
//! waiting, so the construction routine of these types can never stall any
//! caller but the one running it.

use crate::cell::Unblock;
use crate::state::WaiterQueue;
use crate::Internal;

use self::internal::NoBlock;

/// A holder for a lazily constructed resource and the routine constructing
/// it, which never waits for its guard.
///
/// This type does not permit any (potentially) blocking operations, only their
/// respective non-blocking counterparts and is thus `#[no_std]` compatible.
///
/// For the API of this type alias, see the API of the generic
/// [`Singleton`](crate::doc::Singleton) type.
///
/// # Examples
///
/// Neither unbounded nor time-bounded waiting is available:
///
/// ```compile_fail
/// use std::time::Duration;
///
/// use guarded_once::noblock::Singleton;
///
/// let db: Singleton<&str> = Singleton::new(|| "connection");
/// let _ = db.acquire_timeout(Duration::from_millis(10));
/// ```
///
/// ```
/// use guarded_once::noblock::Singleton;
///
/// let db: Singleton<&str> = Singleton::new(|| "connection");
/// assert_eq!(db.try_acquire(), Ok(&"connection"));
/// ```
pub type Singleton<T, F = fn() -> T> = crate::singleton::Singleton<T, NoBlock, F>;

/// A holder for a lazily constructed resource and a fallible routine
/// constructing it, which never waits for its guard.
///
/// This type does not permit any (potentially) blocking operations, only their
/// respective non-blocking counterparts and is thus `#[no_std]` compatible.
///
/// For the API of this type alias, see the API of the generic
/// [`FallibleSingleton`](crate::doc::FallibleSingleton) type.
pub type FallibleSingleton<T, E, F = fn() -> Result<T, E>> =
    crate::singleton::FallibleSingleton<T, E, NoBlock, F>;

/// An interior mutability cell which constructs its resource exactly once and
/// never waits for its guard.
///
/// This type does not permit any (potentially) blocking operations, only their
/// respective non-blocking counterparts and is thus `#[no_std]` compatible.
///
/// For the API of this type alias, see the generic
/// [`SingletonCell`](crate::doc::SingletonCell) type.
pub type SingletonCell<T> = crate::cell::SingletonCell<T, NoBlock>;

mod internal {
    /// "Blocking" strategy which does not actually allow blocking.
    #[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub struct NoBlock;
}

/********** impl Internal *************************************************************************/

impl Internal for NoBlock {}

/********** impl Unblock **************************************************************************/

impl Unblock for NoBlock {
    #[inline(always)]
    unsafe fn on_unblock(queue: WaiterQueue) {
        debug_assert!(queue.is_empty());
    }
}
