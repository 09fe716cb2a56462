//! This crate provides lazily constructed singleton resources, which are
//! guarded by a mutual exclusion lock and constructed exactly once, no matter
//! how many threads request them concurrently.
//!
//! All types exported through the [`noblock`] and [`spin`] modules are fully
//! `#[no_std]` compatible.
//!
//! # Synchronization Primitives
//!
//! With the `std` cargo feature enabled (which is the default setting), this
//! crate provides the [`Singleton`], [`FallibleSingleton`] and
//! [`SingletonCell`] types, which park blocked threads, and the equivalents of
//! these types using spin-locks in the `spin` sub-module.
//!
//! ## Singleton
//!
//! A holder for a resource and the routine constructing it on first demand.
//! Every call to [`acquire`](crate::doc::Singleton::acquire) returns a
//! reference to the same resource.
//!
//! ## FallibleSingleton
//!
//! Like [`Singleton`], but the construction routine may fail.
//! A failed construction leaves the singleton uninitialized, so a later call
//! may retry.
//!
//! ## SingletonCell
//!
//! The underlying cell type, which receives the construction routine with
//! every call instead of storing it.
//!
//! # Guarding
//!
//! Every access takes the singleton's guard, including all accesses after the
//! resource has become ready.
//! The first caller holds the guard for the entire construction, so all other
//! callers wait for it to complete and can never observe a partially
//! constructed resource.
//!
//! # Sharing
//!
//! Singletons are plain values, which are meant to be created once and then
//! passed by reference (or [`Arc`](std::sync::Arc)) to every consumer:
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use guarded_once::Singleton;
//!
//! struct Connection {
//!     url: &'static str,
//! }
//!
//! let db = Arc::new(Singleton::new(|| Connection { url: "postgres://localhost" }));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let db = Arc::clone(&db);
//!         thread::spawn(move || db.acquire().url)
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert_eq!(handle.join().unwrap(), "postgres://localhost");
//! }
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![deny(missing_docs)]
#![forbid(clippy::undocumented_unsafe_blocks)]

#[cfg(test)]
#[macro_use]
mod tests;

pub mod noblock;
pub mod spin;

/// Re-exports of internal generic types for the purpose of accessing their
/// documentation.
pub mod doc {
    pub use crate::cell::SingletonCell;
    pub use crate::singleton::{FallibleSingleton, Singleton};
}

mod cell;
mod error;
mod singleton;
mod state;

#[cfg(feature = "std")]
mod park;

pub use crate::cell::{Acquisition, SingletonState};
pub use crate::error::{ConstructionFailed, TimedOut, TryGetError, TryInitError, WouldBlockError};

#[cfg(feature = "std")]
pub use crate::park::{FallibleSingleton, Singleton, SingletonCell};

mod internal {
    /// Seals the blocking strategy traits.
    pub trait Internal {}
}

use crate::internal::Internal;
