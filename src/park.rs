use std::{
    cell::Cell,
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, Thread},
};

use conquer_util::BackOff;

use crate::{
    cell::{Block, Unblock},
    state::{
        AtomicGuardState,
        GuardState::{Locked, Unlocked},
        WaiterQueue,
    },
    Internal,
};

use self::internal::ParkThread;

/// A holder for a lazily constructed resource and the routine constructing it
/// on first demand.
///
/// This type uses the blocking synchronization mechanism provided by the
/// underlying operating system.
///
/// For the API of this type alias, see the API of the generic
/// [`Singleton`](crate::doc::Singleton) type.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use guarded_once::{Acquisition, Singleton};
///
/// struct Connection;
///
/// let db: Singleton<Connection> = Singleton::new(|| {
///     // models a slow connection setup
///     thread::sleep(std::time::Duration::from_millis(10));
///     Connection
/// });
///
/// let constructed = thread::scope(|scope| {
///     let db = &db;
///     let handles: Vec<_> =
///         (0..4).map(|_| scope.spawn(move || db.acquire_with_outcome().1)).collect();
///     handles
///         .into_iter()
///         .map(|handle| handle.join().unwrap())
///         .filter(|outcome| *outcome == Acquisition::Constructed)
///         .count()
/// });
///
/// assert_eq!(constructed, 1);
/// ```
pub type Singleton<T, F = fn() -> T> = crate::singleton::Singleton<T, ParkThread, F>;

/// A holder for a lazily constructed resource and a fallible routine
/// constructing it on first demand.
///
/// This type uses the blocking synchronization mechanism provided by the
/// underlying operating system.
///
/// For the API of this type alias, see the API of the generic
/// [`FallibleSingleton`](crate::doc::FallibleSingleton) type.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use guarded_once::{FallibleSingleton, SingletonState};
///
/// let online = AtomicBool::new(false);
/// let db = FallibleSingleton::new(|| match online.load(Ordering::Relaxed) {
///     true => Ok("connection"),
///     false => Err("database offline"),
/// });
///
/// assert!(db.acquire().is_err());
/// assert_eq!(db.state(), SingletonState::Uninitialized);
///
/// online.store(true, Ordering::Relaxed);
/// assert_eq!(db.acquire(), Ok(&"connection"));
/// ```
pub type FallibleSingleton<T, E, F = fn() -> Result<T, E>> =
    crate::singleton::FallibleSingleton<T, E, ParkThread, F>;

/// An interior mutability cell which constructs its resource exactly once and
/// grants read-only access to it exclusively after construction.
///
/// This type uses the blocking synchronization mechanism provided by the
/// underlying operating system.
///
/// For the API of this type alias, see the generic
/// [`SingletonCell`](crate::doc::SingletonCell) type.
pub type SingletonCell<T> = crate::cell::SingletonCell<T, ParkThread>;

mod internal {
    /// Blocking strategy using low-level and OS reliant parking and un-parking
    /// mechanisms.
    #[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub struct ParkThread;
}

/********** impl Internal *************************************************************************/

impl Internal for ParkThread {}

/********** impl Unblock **************************************************************************/

impl Unblock for ParkThread {
    /// Unblocks all threads that have been parked while the guard was held.
    #[inline]
    unsafe fn on_unblock(queue: WaiterQueue) {
        let mut curr = queue.head();
        while !curr.is_null() {
            let thread = {
                // SAFETY: no mutable references to a stack waiter can exist
                // and the waiter is ensured to live while its thread is
                // parked, so the pointer can be safely dereferenced
                let waiter = unsafe { &*curr };
                curr = waiter.next.get();
                // there can be no data race when mutating the thread-cell as
                // only the unblocking thread accesses it, the stack waiter can
                // be dropped as soon as the following store becomes visible,
                // so the thread MUST be taken out first
                let thread = waiter.thread.take();
                // (ready:2) this release store syncs-with the acquire load (ready:1)
                waiter.ready.store(true, Ordering::Release);
                thread
            };

            if let Some(thread) = thread {
                thread.unpark();
            }
        }
    }
}

/********** impl Block ****************************************************************************/

impl Block for ParkThread {
    /// Blocks (parks) the current thread until it is woken up by the thread
    /// releasing the guard.
    #[inline]
    fn block(state: &AtomicGuardState) {
        let backoff = BackOff::new();
        // spin a little before parking the thread in case the guard is
        // quickly released again
        let queue = loop {
            // the subsequent acquire CAS (lock:1) provides the required
            // synchronization
            match state.load(Ordering::Relaxed) {
                Unlocked => return,
                Locked(queue) if backoff.advise_yield() => break queue,
                Locked(_) => {}
            }

            backoff.spin();
        };
        backoff.reset();

        // create a linked list node on the current thread's stack, which is
        // guaranteed to stay alive while the thread is parked
        let waiter = StackWaiter {
            thread: Cell::new(Some(thread::current())),
            ready: AtomicBool::new(false),
            next: Cell::new(queue.head()),
        };

        let mut curr = queue;
        let new_head = WaiterQueue::from(&waiter as *const StackWaiter);

        // put the current thread to the front of the list of parked threads
        // (wait:1) this acq-rel CAS syncs-with the acq-rel swap (unlock:1)
        while let Err(err) = state.try_swap_waiters(curr, new_head, Ordering::AcqRel) {
            match err {
                // another parked thread succeeded in placing itself at the
                // queue's front
                Locked(queue) => {
                    // the waiter hasn't been shared yet, so it's still safe to
                    // mutate the next pointer
                    curr = queue;
                    waiter.next.set(queue.head());
                    backoff.spin();
                }
                // the guard has been released in the meantime, so the caller
                // can immediately attempt to take it again
                Unlocked => return,
            }
        }

        // park the thread until it is woken up by the thread releasing the
        // guard, the loop guards against spurious wake ups
        // (ready:1) this acquire load syncs-with the release store (ready:2)
        while !waiter.ready.load(Ordering::Acquire) {
            thread::park();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// StackWaiter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A linked list node that lives on the stack of a parked thread.
///
/// The alignment ensures no node is ever located at the address used to
/// encode an unlocked guard.
#[repr(align(4))]
struct StackWaiter {
    /// The handle for the parked thread that is used to unpark it, once the
    /// guard is released.
    ///
    /// This field is in fact mutated by a thread that is potentially not the
    /// same as the owning thread, but exclusively in the case where the
    /// mutating thread has exclusive access to this field.
    thread: Cell<Option<Thread>>,
    /// The flag marking the waiter as either blocked or ready to proceed.
    ready: AtomicBool,
    /// The pointer to the next blocked thread.
    ///
    /// This field is mutated exclusively by the owning thread **before** the
    /// waiter becomes visible to other threads.
    next: Cell<*const StackWaiter>,
}

/********** impl From *****************************************************************************/

impl From<*const StackWaiter> for WaiterQueue {
    #[inline]
    fn from(waiter: *const StackWaiter) -> Self {
        Self { head: waiter as *const () }
    }
}

/********** ext impl WaiterQueue ******************************************************************/

impl WaiterQueue {
    #[inline]
    fn head(self) -> *const StackWaiter {
        self.head as *const _
    }
}
