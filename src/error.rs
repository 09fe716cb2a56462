//! Error types returned by fallible, non-blocking and time-bounded
//! operations.

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConstructionFailed
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The construction routine failed with an error of type `E`.
///
/// The singleton has been reset to its uninitialized state, so any later call
/// will attempt the construction again.
#[derive(Copy, Clone, Debug, Error, Hash, Eq, PartialEq)]
#[error("construction of the singleton resource failed")]
pub struct ConstructionFailed<E> {
    #[source]
    source: E,
}

/********** impl inherent *************************************************************************/

impl<E> ConstructionFailed<E> {
    #[inline]
    pub(crate) fn new(source: E) -> Self {
        Self { source }
    }

    /// Returns a reference to the error returned by the construction routine.
    #[inline]
    pub fn inner(&self) -> &E {
        &self.source
    }

    /// Consumes `self` and returns the error returned by the construction
    /// routine.
    #[inline]
    pub fn into_inner(self) -> E {
        self.source
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// TryGetError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Possible error variants of non-blocking get calls.
#[derive(Copy, Clone, Debug, Error, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub enum TryGetError {
    /// The singleton is currently not initialized.
    #[error("the singleton resource is uninitialized")]
    Uninit,
    /// The guard is currently held by another caller and the current thread
    /// would have to block.
    #[error("the singleton guard is currently held by another caller")]
    WouldBlock,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// TryInitError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Possible error variants of non-blocking fallible initialization calls.
#[derive(Copy, Clone, Debug, Error, Hash, Eq, PartialEq)]
pub enum TryInitError<E> {
    /// The guard is currently held by another caller and the current thread
    /// would have to block.
    #[error("the singleton guard is currently held by another caller")]
    WouldBlock,
    /// The construction routine was called and failed.
    #[error("construction of the singleton resource failed")]
    ConstructionFailed(#[source] E),
}

/********** impl From *****************************************************************************/

impl<E> From<WouldBlockError> for TryInitError<E> {
    #[inline]
    fn from(_: WouldBlockError) -> Self {
        TryInitError::WouldBlock
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// WouldBlockError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An error indicating that the guard of a singleton is held by another
/// caller and the operation would have to block.
#[derive(Copy, Clone, Debug, Error, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[error("the singleton guard is currently held by another caller")]
pub struct WouldBlockError(pub(crate) ());

////////////////////////////////////////////////////////////////////////////////////////////////////
// TimedOut
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An error indicating that the guard of a singleton could not be taken
/// within the given duration.
///
/// Only the waiting was abandoned, a construction running on another thread
/// is never interrupted.
#[derive(Copy, Clone, Debug, Error, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[error("timed out waiting for the singleton guard")]
pub struct TimedOut(pub(crate) ());
