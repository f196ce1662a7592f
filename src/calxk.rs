//! Home of Calxk, a mutex-locked wrapper of Calx.

use crate::{source::MemorySource, Calx};

/// Calx lock, contains a mutex-locked [`Calx`].
///
/// The collector itself is single threaded by design; this wrapper serializes
/// an entire embedding around one lock so the heap manager can live in a
/// `static`. It is the only thread-safety the crate offers.
///
/// # Example
/// ```rust
/// # use calx::*;
/// let calx = Calx::new(MmapSource);
/// let calxk = calx.lock::<spin::Mutex<()>>();
/// ```
#[derive(Debug)]
pub struct Calxk<R: lock_api::RawMutex, M: MemorySource> {
    mutex: lock_api::Mutex<R, Calx<M>>,
}

impl<R: lock_api::RawMutex, M: MemorySource> Calxk<R, M> {
    /// Create a new `Calxk`.
    pub const fn new(calx: Calx<M>) -> Self {
        Self { mutex: lock_api::Mutex::new(calx) }
    }

    /// Lock the mutex and access the inner `Calx`.
    pub fn lock(&self) -> lock_api::MutexGuard<R, Calx<M>> {
        self.mutex.lock()
    }

    /// Try to lock the mutex and access the inner `Calx`.
    pub fn try_lock(&self) -> Option<lock_api::MutexGuard<R, Calx<M>>> {
        self.mutex.try_lock()
    }

    /// Retrieve the inner `Calx`.
    pub fn into_inner(self) -> Calx<M> {
        self.mutex.into_inner()
    }
}

impl<M: MemorySource> Calx<M> {
    /// Wrap in `Calxk`, a mutex-locked wrapper struct using [`lock_api`].
    pub const fn lock<R: lock_api::RawMutex>(self) -> Calxk<R, M> {
        Calxk::new(self)
    }
}
