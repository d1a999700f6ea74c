//! Locking shim for the tracker and the private arena.
//!
//! `HookMutex` wraps a const-initialized `parking_lot::RawMutex`, so a lock
//! exists from the first instruction of the process with no fallible
//! creation step. With the `thread-safe` feature (default) every acquisition is real;
//! without it the client promises a single-threaded process and locking
//! compiles to nothing.

#[cfg(feature = "thread-safe")]
use parking_lot::RawMutex;
#[cfg(feature = "thread-safe")]
use parking_lot::lock_api::RawMutex as _;

pub(crate) struct HookMutex {
    #[cfg(feature = "thread-safe")]
    raw: RawMutex,
}

impl HookMutex {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(feature = "thread-safe")]
            raw: RawMutex::INIT,
        }
    }

    /// Hold the lock for the lifetime of the returned guard. Not reentrant.
    pub(crate) fn guard(&self) -> HookGuard<'_> {
        #[cfg(feature = "thread-safe")]
        self.raw.lock();
        HookGuard { mutex: self }
    }
}

pub(crate) struct HookGuard<'a> {
    mutex: &'a HookMutex,
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        let mutex = self.mutex;
        // SAFETY: the guard was handed out by `guard()`, which locked.
        #[cfg(feature = "thread-safe")]
        unsafe {
            mutex.raw.unlock()
        }
        #[cfg(not(feature = "thread-safe"))]
        let _ = mutex;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let mutex = HookMutex::new();
        drop(mutex.guard());
        // A second acquisition must not block.
        drop(mutex.guard());
    }
}
