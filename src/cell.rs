//! Generic definition and implementation of the [`SingletonCell`] type.

use core::any;
use core::cell::UnsafeCell;
use core::convert::Infallible;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::Ordering;

use crate::error::{ConstructionFailed, TryGetError, TryInitError, WouldBlockError};
use crate::state::{AtomicGuardState, WaiterQueue};
use crate::Internal;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Unblock (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A sealed trait for abstracting over the release side of different
/// blocking strategies.
pub trait Unblock: Internal {
    /// Unblocks all threads that have queued up while the guard was held.
    ///
    /// # Safety
    ///
    /// `queue` must have been returned by releasing the guard and must not be
    /// unblocked more than once.
    unsafe fn on_unblock(queue: WaiterQueue);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Block (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A sealed trait for abstracting over different blocking strategies.
pub trait Block: Unblock {
    /// Blocks the current thread until the guard has been released.
    ///
    /// Returning does not mean the guard has been acquired, the caller has to
    /// attempt to take it again.
    fn block(state: &AtomicGuardState);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// SingletonState
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The observable initialization state of a singleton.
///
/// Internally, a singleton is also *constructing* while its construction
/// routine runs, but since the guard is held for the entire construction no
/// caller can ever observe this transitional state.
#[derive(Copy, Clone, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub enum SingletonState {
    /// The resource has not (yet) been constructed, or its last construction
    /// attempt failed.
    Uninitialized,
    /// The resource has been constructed and will remain so.
    Ready,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Acquisition
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Reports how a successful acquisition obtained its resource.
#[derive(Copy, Clone, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub enum Acquisition {
    /// The calling thread ran the construction routine.
    Constructed,
    /// The resource had already been constructed by an earlier call.
    AlreadyReady,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Slot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The guarded tri-state storage of a [`SingletonCell`].
enum Slot<T> {
    Uninit,
    Constructing,
    Ready(T),
}

/********** impl inherent *************************************************************************/

impl<T> Slot<T> {
    #[inline]
    fn state(&self) -> SingletonState {
        match self {
            Slot::Ready(_) => SingletonState::Ready,
            // a lock holder observing `Constructing` is itself the constructor
            Slot::Uninit | Slot::Constructing => SingletonState::Uninitialized,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// SingletonCell
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An interior mutability cell which constructs its resource exactly once and
/// grants read-only access to it exclusively after construction.
///
/// Every access, including those after the resource has become ready, takes
/// the cell's mutual exclusion guard first.
/// The construction routine runs while the guard is held, so no caller can
/// ever observe a partially constructed resource.
///
/// # Failure
///
/// A construction routine that returns an error or panics leaves the cell
/// uninitialized and releases the guard.
/// The next caller to take the guard attempts the construction again.
///
/// # Deadlocks
///
/// Calling a blocking operation on the same cell from within its construction
/// routine never returns.
/// The non-blocking `try_*` operations report
/// [`WouldBlock`][TryGetError::WouldBlock] instead.
pub struct SingletonCell<T, B> {
    guard: AtomicGuardState,
    slot: UnsafeCell<Slot<T>>,
    _marker: PhantomData<B>,
}

/********** impl Send + Sync **********************************************************************/

// SAFETY: the resource may be constructed by one thread and dropped by another
unsafe impl<T, B> Send for SingletonCell<T, B> where T: Send {}
// SAFETY: all accesses to the slot are serialized by the guard and shared
// references to the resource are handed out to any number of threads
unsafe impl<T, B> Sync for SingletonCell<T, B> where T: Send + Sync {}

/********** impl inherent *************************************************************************/

impl<T, B> SingletonCell<T, B> {
    /// Creates a new uninitialized [`SingletonCell`].
    #[inline]
    pub const fn uninit() -> Self {
        Self {
            guard: AtomicGuardState::new(),
            slot: UnsafeCell::new(Slot::Uninit),
            _marker: PhantomData,
        }
    }

    /// Consumes `self` and returns a [`Some(T)`](Some) if the resource has
    /// previously been constructed or [`None`] otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_once::spin::SingletonCell;
    ///
    /// let uninit: SingletonCell<i32> = SingletonCell::uninit();
    /// assert!(uninit.into_inner().is_none());
    ///
    /// let cell = SingletonCell::uninit();
    /// cell.get_or_init(|| "connected");
    /// assert_eq!(cell.into_inner(), Some("connected"));
    /// ```
    #[inline]
    pub fn into_inner(self) -> Option<T> {
        match self.slot.into_inner() {
            Slot::Ready(resource) => Some(resource),
            _ => None,
        }
    }

    /// Returns a mutable reference to the resource if it has previously been
    /// constructed.
    ///
    /// The exclusive borrow statically guarantees no other caller can access
    /// the cell, so the guard is not taken.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self.slot.get_mut() {
            Slot::Ready(resource) => Some(resource),
            _ => None,
        }
    }

    /// Returns a reference to the resource without taking the guard.
    ///
    /// # Safety
    ///
    /// The slot must have been observed as ready while holding the guard.
    #[inline]
    unsafe fn ready_unchecked(&self) -> &T {
        // SAFETY: a ready slot is never written to again through a shared
        // reference, so there can be no concurrent writer
        match unsafe { &*self.slot.get() } {
            Slot::Ready(resource) => resource,
            _ => unreachable!("the singleton resource must be ready"),
        }
    }
}

impl<T, B: Unblock> SingletonCell<T, B> {
    /// Returns a reference to the constructed resource or an [`Err`].
    ///
    /// This method never blocks.
    ///
    /// # Errors
    ///
    /// This method fails if the resource has not been constructed
    /// ([`Uninit`][TryGetError::Uninit]) or the guard is currently held by
    /// some other caller ([`WouldBlock`][TryGetError::WouldBlock]).
    #[inline]
    pub fn try_get(&self) -> Result<&T, TryGetError> {
        let lock = self.try_lock().map_err(|_| TryGetError::WouldBlock)?;
        lock.release().ok_or(TryGetError::Uninit)
    }

    /// Returns a reference to the resource, constructing it with `func` first
    /// if necessary.
    ///
    /// This method never blocks.
    ///
    /// # Errors
    ///
    /// This method only fails if the guard is currently held by some other
    /// caller, e.g. while it is constructing the resource.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_once::noblock::SingletonCell;
    ///
    /// let cell = SingletonCell::uninit();
    /// let res = cell.try_get_or_init(|| {
    ///     // the guard is held for the entire construction
    ///     assert!(cell.try_get_or_init(|| 2).is_err());
    ///     1
    /// });
    ///
    /// assert_eq!(res, Ok(&1));
    /// ```
    #[inline]
    pub fn try_get_or_init(&self, func: impl FnOnce() -> T) -> Result<&T, WouldBlockError> {
        let lock = self.try_lock()?;
        let (resource, _) = infallible(lock.get_or_construct(|| Ok(func())));
        Ok(resource)
    }

    /// Returns a reference to the resource, attempting to construct it with
    /// the fallible `func` first if necessary.
    ///
    /// This method never blocks.
    ///
    /// # Errors
    ///
    /// This method fails with [`WouldBlock`][TryInitError::WouldBlock] if the
    /// guard is currently held by some other caller and with
    /// [`ConstructionFailed`][TryInitError::ConstructionFailed] if `func` was
    /// called and returned an error.
    /// In the latter case the cell remains uninitialized.
    #[inline]
    pub fn try_get_or_try_init<E>(
        &self,
        func: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, TryInitError<E>> {
        let lock = self.try_lock()?;
        match lock.get_or_construct(func) {
            Ok((resource, _)) => Ok(resource),
            Err(err) => Err(TryInitError::ConstructionFailed(err)),
        }
    }

    /// Attempts to take the guard without blocking.
    #[inline]
    fn try_lock(&self) -> Result<GuardLock<'_, T, B>, WouldBlockError> {
        // (lock:1) this acquire CAS syncs-with the acq-rel swap (unlock:1)
        match self.guard.try_lock(Ordering::Acquire) {
            Ok(_) => Ok(GuardLock { cell: self }),
            Err(_) => Err(WouldBlockError(())),
        }
    }
}

impl<T, B: Block> SingletonCell<T, B> {
    /// Returns a reference to the constructed resource or [`None`].
    ///
    /// This method **blocks** while the guard is held by another caller.
    /// See [`try_get`][SingletonCell::try_get] for a non-blocking alternative.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.lock().release()
    }

    /// Returns the current initialization state of the cell.
    ///
    /// This method **blocks** while the guard is held by another caller.
    #[inline]
    pub fn state(&self) -> SingletonState {
        self.lock().state()
    }

    /// Returns `true` if the resource has been constructed.
    ///
    /// This method **blocks** while the guard is held by another caller.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state() == SingletonState::Ready
    }

    /// Returns a reference to the resource, constructing it with `func` first
    /// if necessary.
    ///
    /// This method **blocks** while the guard is held by another caller,
    /// including for the entire duration of a concurrent construction.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_once::SingletonCell;
    ///
    /// let cell = SingletonCell::uninit();
    /// let first = cell.get_or_init(|| String::from("connection"));
    /// // the resource is ready, the routine is not called again
    /// let second = cell.get_or_init(|| unreachable!());
    ///
    /// assert!(std::ptr::eq(first, second));
    /// ```
    #[inline]
    pub fn get_or_init(&self, func: impl FnOnce() -> T) -> &T {
        self.get_or_init_with_outcome(func).0
    }

    /// Returns a reference to the resource along with the report whether the
    /// calling thread constructed it.
    ///
    /// This method **blocks** while the guard is held by another caller.
    #[inline]
    pub fn get_or_init_with_outcome(&self, func: impl FnOnce() -> T) -> (&T, Acquisition) {
        infallible(self.lock().get_or_construct(|| Ok(func())))
    }

    /// Returns a reference to the resource, attempting to construct it with
    /// the fallible `func` first if necessary.
    ///
    /// This method **blocks** while the guard is held by another caller.
    ///
    /// # Errors
    ///
    /// This method fails if `func` was called and returned an error, in which
    /// case the cell remains uninitialized and a later call may retry.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_once::{SingletonCell, SingletonState};
    ///
    /// let cell = SingletonCell::uninit();
    ///
    /// let res = cell.get_or_try_init(|| Err("connection refused"));
    /// assert_eq!(res.unwrap_err().into_inner(), "connection refused");
    /// assert_eq!(cell.state(), SingletonState::Uninitialized);
    ///
    /// let res = cell.get_or_try_init(|| Ok::<_, &str>(1));
    /// assert_eq!(res, Ok(&1));
    /// ```
    #[inline]
    pub fn get_or_try_init<E>(
        &self,
        func: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, ConstructionFailed<E>> {
        match self.lock().get_or_construct(func) {
            Ok((resource, _)) => Ok(resource),
            Err(err) => Err(ConstructionFailed::new(err)),
        }
    }

    /// Takes the guard, blocking the current thread until it is available.
    #[inline]
    fn lock(&self) -> GuardLock<'_, T, B> {
        loop {
            match self.try_lock() {
                Ok(lock) => return lock,
                Err(_) => B::block(&self.guard),
            }
        }
    }
}

#[cfg(feature = "std")]
mod timeout {
    use std::thread;
    use std::time::{Duration, Instant};

    use conquer_util::BackOff;

    use crate::error::TimedOut;

    use super::{infallible, Block, GuardLock, SingletonCell};

    /// The upper bound for sleeping between two attempts to take the guard,
    /// once spinning is no longer advisable.
    const POLL_INTERVAL: Duration = Duration::from_millis(1);

    impl<T, B: Block> SingletonCell<T, B> {
        /// Returns a reference to the resource, constructing it with `func`
        /// first if necessary, but waits at most `timeout` for the guard.
        ///
        /// Once the guard has been taken the construction runs to completion
        /// regardless of `timeout`.
        ///
        /// # Errors
        ///
        /// This method fails if the guard could not be taken in time, e.g.
        /// because another caller is still constructing the resource.
        #[inline]
        pub fn get_or_init_timeout(
            &self,
            func: impl FnOnce() -> T,
            timeout: Duration,
        ) -> Result<&T, TimedOut> {
            let lock = self.lock_timeout(timeout)?;
            let (resource, _) = infallible(lock.get_or_construct(|| Ok(func())));
            Ok(resource)
        }

        fn lock_timeout(&self, timeout: Duration) -> Result<GuardLock<'_, T, B>, TimedOut> {
            // an unrepresentable deadline is as good as none
            let deadline = Instant::now().checked_add(timeout);
            let backoff = BackOff::new();
            loop {
                if let Ok(lock) = self.try_lock() {
                    return Ok(lock);
                }

                let remaining = match deadline {
                    Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                        Some(remaining) if remaining > Duration::ZERO => remaining,
                        _ => return Err(TimedOut(())),
                    },
                    None => POLL_INTERVAL,
                };

                if backoff.advise_yield() {
                    thread::sleep(remaining.min(POLL_INTERVAL));
                } else {
                    backoff.spin();
                }
            }
        }
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug, B: Unblock> fmt::Debug for SingletonCell<T, B> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SingletonCell").field("inner", &self.try_get().ok()).finish()
    }
}

/********** impl Default **************************************************************************/

impl<T, B> Default for SingletonCell<T, B> {
    #[inline]
    fn default() -> Self {
        Self::uninit()
    }
}

#[inline]
fn infallible<T>(res: Result<T, Infallible>) -> T {
    match res {
        Ok(res) => res,
        Err(never) => match never {},
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// GuardLock
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Proof of holding the guard of a [`SingletonCell`], which is released when
/// the lock is dropped.
struct GuardLock<'a, T, B: Unblock> {
    cell: &'a SingletonCell<T, B>,
}

impl<'a, T, B: Unblock> GuardLock<'a, T, B> {
    #[inline]
    fn state(&self) -> SingletonState {
        // SAFETY: the guard is held, so there can be no concurrent writer
        unsafe { (*self.cell.slot.get()).state() }
    }

    /// Releases the guard and returns the resource, if it has been
    /// constructed.
    #[inline]
    fn release(self) -> Option<&'a T> {
        match self.state() {
            // SAFETY: the state has just been checked while holding the guard
            SingletonState::Ready => Some(unsafe { self.release_ready() }),
            _ => None,
        }
    }

    /// Releases the guard and returns the resource.
    ///
    /// # Safety
    ///
    /// The slot must be ready.
    #[inline]
    unsafe fn release_ready(self) -> &'a T {
        let cell = self.cell;
        drop(self);
        // SAFETY: ready slots are never written to again, so the reference
        // remains valid after releasing the guard
        unsafe { cell.ready_unchecked() }
    }

    #[inline]
    fn get_or_construct<E>(
        self,
        func: impl FnOnce() -> Result<T, E>,
    ) -> Result<(&'a T, Acquisition), E> {
        if self.state() == SingletonState::Ready {
            tracing::trace!(resource = any::type_name::<T>(), "singleton resource already ready");
            // SAFETY: the state has just been checked while holding the guard
            return Ok((unsafe { self.release_ready() }, Acquisition::AlreadyReady));
        }

        self.construct(func).map(|resource| (resource, Acquisition::Constructed))
    }

    /// This method is annotated with `#[cold]` in order to keep it out of the
    /// path taken by all callers after the first.
    #[inline(never)]
    #[cold]
    fn construct<E>(self, func: impl FnOnce() -> Result<T, E>) -> Result<&'a T, E> {
        // SAFETY: the guard is held, so there can be no concurrent writer
        debug_assert!(matches!(unsafe { &*self.cell.slot.get() }, Slot::Uninit));
        tracing::debug!(resource = any::type_name::<T>(), "constructing singleton resource");

        let guard = ConstructGuard::begin(self);
        let resource = func()?;
        let resource = guard.complete(resource);

        tracing::debug!(resource = any::type_name::<T>(), "singleton resource ready");
        Ok(resource)
    }
}

/********** impl Drop *****************************************************************************/

impl<T, B: Unblock> Drop for GuardLock<'_, T, B> {
    #[inline]
    fn drop(&mut self) {
        // (unlock:1) this acq-rel swap syncs-with the acquire CAS (lock:1) and
        // the acq-rel CAS (wait:1) of any enqueued waiter
        let queue = self.cell.guard.unlock(Ordering::AcqRel);
        // SAFETY: the queue has just been taken out of the released guard
        unsafe { B::on_unblock(queue) };
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConstructGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A guard resetting the slot if the construction routine returns early with
/// an error or panics.
///
/// The contained lock is released only after the slot has been reset.
struct ConstructGuard<'a, T, B: Unblock> {
    lock: GuardLock<'a, T, B>,
    armed: bool,
}

impl<'a, T, B: Unblock> ConstructGuard<'a, T, B> {
    #[inline]
    fn begin(lock: GuardLock<'a, T, B>) -> Self {
        // SAFETY: the guard is held and the slot is not ready, so no reference
        // into the slot can exist
        unsafe { *lock.cell.slot.get() = Slot::Constructing };
        Self { lock, armed: true }
    }

    /// Stores the constructed resource, consumes the guard and releases the
    /// lock.
    #[inline]
    fn complete(mut self, resource: T) -> &'a T {
        // SAFETY: the slot is still `Constructing`, so no reference into it
        // can exist
        unsafe { *self.lock.cell.slot.get() = Slot::Ready(resource) };
        self.armed = false;

        let cell = self.lock.cell;
        drop(self);
        // SAFETY: the slot has been set to ready above
        unsafe { cell.ready_unchecked() }
    }
}

/********** impl Drop *****************************************************************************/

impl<T, B: Unblock> Drop for ConstructGuard<'_, T, B> {
    #[inline]
    fn drop(&mut self) {
        if self.armed {
            // SAFETY: the slot is still `Constructing`, so no reference into it
            // can exist
            unsafe { *self.lock.cell.slot.get() = Slot::Uninit };
            tracing::warn!(
                resource = any::type_name::<T>(),
                "singleton construction aborted, guard released for retry"
            );
        }
    }
}
