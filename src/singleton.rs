//! Generic definition and implementation of the [`Singleton`] and
//! [`FallibleSingleton`] types.

use core::fmt;
use core::marker::PhantomData;

use crate::cell::{Acquisition, Block, SingletonCell, SingletonState, Unblock};
use crate::error::{ConstructionFailed, TryGetError, TryInitError, WouldBlockError};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Singleton
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A holder for a lazily constructed shared resource and the routine
/// constructing it on first demand.
///
/// Construct it once and pass it by reference to every consumer.
/// All calls to [`acquire`](Singleton::acquire) return the same resource and
/// exactly one of them runs the construction routine.
pub struct Singleton<T, B, F = fn() -> T> {
    cell: SingletonCell<T, B>,
    init: F,
}

/********** impl inherent *************************************************************************/

impl<T, B, F> Singleton<T, B, F> {
    /// Creates a new uninitialized [`Singleton`] with the given `init`
    /// routine.
    #[inline]
    pub const fn new(init: F) -> Self {
        Self { cell: SingletonCell::uninit(), init }
    }

    /// Consumes `self` and returns the resource, if it has been constructed.
    #[inline]
    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }
}

impl<T, B, F> Singleton<T, B, F>
where
    B: Unblock,
    F: Fn() -> T,
{
    /// Returns a reference to the constructed resource or an [`Err`].
    ///
    /// This method never blocks and never runs the construction routine.
    #[inline]
    pub fn try_get(&self) -> Result<&T, TryGetError> {
        self.cell.try_get()
    }

    /// Returns a reference to the resource, constructing it first if no
    /// previous call has done so.
    ///
    /// This method never blocks.
    ///
    /// # Errors
    ///
    /// This method fails if the guard is held by another caller, e.g. while
    /// it is constructing the resource.
    #[inline]
    pub fn try_acquire(&self) -> Result<&T, WouldBlockError> {
        self.cell.try_get_or_init(|| (self.init)())
    }
}

#[cfg(feature = "std")]
impl<T, B, F> Singleton<T, B, F>
where
    B: Block,
    F: Fn() -> T,
{
    /// Returns a reference to the resource, constructing it first if no
    /// previous call has done so, but waits at most `timeout` for the guard.
    ///
    /// A construction that has begun, whether by this or any other caller, is
    /// never interrupted.
    ///
    /// # Errors
    ///
    /// This method fails if the guard could not be taken within `timeout`.
    #[inline]
    pub fn acquire_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<&T, crate::error::TimedOut> {
        self.cell.get_or_init_timeout(|| (self.init)(), timeout)
    }
}

impl<T, B, F> Singleton<T, B, F>
where
    B: Block,
    F: Fn() -> T,
{
    /// Returns a reference to the resource, constructing it first if no
    /// previous call has done so.
    ///
    /// This method **blocks** while the guard is held by another caller,
    /// including for the entire duration of a concurrent construction.
    #[inline]
    pub fn acquire(&self) -> &T {
        self.cell.get_or_init(|| (self.init)())
    }

    /// Returns a reference to the resource along with the report whether this
    /// call constructed it.
    #[inline]
    pub fn acquire_with_outcome(&self) -> (&T, Acquisition) {
        self.cell.get_or_init_with_outcome(|| (self.init)())
    }

    /// Returns a reference to the resource if it has already been constructed.
    ///
    /// This method **blocks** while the guard is held by another caller but
    /// never runs the construction routine.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Returns the current initialization state.
    #[inline]
    pub fn state(&self) -> SingletonState {
        self.cell.state()
    }

    /// Returns `true` if the resource has been constructed.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.cell.is_initialized()
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug, B: Unblock, F> fmt::Debug for Singleton<T, B, F> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Singleton").field("cell", &self.cell).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// FallibleSingleton
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A holder for a lazily constructed shared resource and a fallible routine
/// constructing it on first demand.
///
/// A failed construction leaves the singleton uninitialized and the error is
/// returned only to the caller that ran it.
/// Callers waiting in the meantime attempt the construction themselves once
/// they get their turn, so at most one construction ever *succeeds*.
pub struct FallibleSingleton<T, E, B, F = fn() -> Result<T, E>> {
    cell: SingletonCell<T, B>,
    init: F,
    _marker: PhantomData<fn() -> E>,
}

/********** impl inherent *************************************************************************/

impl<T, E, B, F> FallibleSingleton<T, E, B, F> {
    /// Creates a new uninitialized [`FallibleSingleton`] with the given
    /// `init` routine.
    #[inline]
    pub const fn new(init: F) -> Self {
        Self { cell: SingletonCell::uninit(), init, _marker: PhantomData }
    }

    /// Consumes `self` and returns the resource, if it has been constructed.
    #[inline]
    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }
}

impl<T, E, B, F> FallibleSingleton<T, E, B, F>
where
    B: Unblock,
    F: Fn() -> Result<T, E>,
{
    /// Returns a reference to the constructed resource or an [`Err`].
    ///
    /// This method never blocks and never runs the construction routine.
    #[inline]
    pub fn try_get(&self) -> Result<&T, TryGetError> {
        self.cell.try_get()
    }

    /// Returns a reference to the resource, attempting to construct it first
    /// if no previous call has succeeded in doing so.
    ///
    /// This method never blocks.
    ///
    /// # Errors
    ///
    /// This method fails if the guard is held by another caller or if the
    /// construction routine was run and failed.
    #[inline]
    pub fn try_acquire(&self) -> Result<&T, TryInitError<E>> {
        self.cell.try_get_or_try_init(|| (self.init)())
    }
}

impl<T, E, B, F> FallibleSingleton<T, E, B, F>
where
    B: Block,
    F: Fn() -> Result<T, E>,
{
    /// Returns a reference to the resource, attempting to construct it first
    /// if no previous call has succeeded in doing so.
    ///
    /// This method **blocks** while the guard is held by another caller.
    ///
    /// # Errors
    ///
    /// This method fails if the construction routine was run by this call and
    /// failed.
    #[inline]
    pub fn acquire(&self) -> Result<&T, ConstructionFailed<E>> {
        self.cell.get_or_try_init(|| (self.init)())
    }

    /// Returns a reference to the resource if it has already been constructed.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Returns the current initialization state.
    #[inline]
    pub fn state(&self) -> SingletonState {
        self.cell.state()
    }

    /// Returns `true` if the resource has been constructed.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.cell.is_initialized()
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug, E, B: Unblock, F> fmt::Debug for FallibleSingleton<T, E, B, F> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FallibleSingleton").field("cell", &self.cell).finish()
    }
}
