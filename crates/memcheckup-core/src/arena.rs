//! Private bookkeeping arena.
//!
//! Every internal structure (bucket heads, live-block nodes, defect
//! records) is carved out of a dedicated `dlmalloc` instance that maps
//! pages straight from the OS. Nothing here touches the process allocator, so the
//! adapter can never re-enter the interposition hooks, and arena memory is
//! never handed to the instrumented program.

use core::cell::UnsafeCell;
use core::ptr;

use dlmalloc::Dlmalloc;

use crate::sync::HookMutex;

/// Alignment of every arena allocation. 16 keeps dlmalloc on its fast path
/// and satisfies any type the engine stores.
pub const ARENA_ALIGN: usize = 16;

/// An isolated heap for bookkeeping memory.
///
/// The heap outlives the instrumented program's last allocation event: it is
/// created once during initialization and never destroyed; the OS reclaims
/// it at process exit.
pub struct Arena {
    lock: HookMutex,
    space: UnsafeCell<Option<Dlmalloc>>,
}

// SAFETY: `space` is only touched under `lock`.
unsafe impl Sync for Arena {}

impl Arena {
    pub const fn new() -> Self {
        Self {
            lock: HookMutex::new(),
            space: UnsafeCell::new(None),
        }
    }

    /// Create the underlying heap. Idempotent.
    pub fn create(&self) {
        let _guard = self.lock.guard();
        // SAFETY: exclusive access under the lock.
        let space = unsafe { &mut *self.space.get() };
        if space.is_none() {
            *space = Some(Dlmalloc::new());
        }
    }

    fn with_space<R>(&self, f: impl FnOnce(&mut Dlmalloc) -> R) -> Option<R> {
        let _guard = self.lock.guard();
        // SAFETY: exclusive access under the lock.
        let space = unsafe { &mut *self.space.get() };
        space.as_mut().map(f)
    }

    /// Allocate `size` bytes. Null before [`Arena::create`] or on exhaustion.
    pub fn alloc(&self, size: usize) -> *mut u8 {
        self.with_space(|space| {
            // SAFETY: the space is live and the request is well-formed.
            unsafe { space.malloc(size, ARENA_ALIGN) }
        })
        .unwrap_or(ptr::null_mut())
    }

    /// Allocate `size` zeroed bytes.
    pub fn alloc_zeroed(&self, size: usize) -> *mut u8 {
        self.with_space(|space| {
            // SAFETY: the space is live and the request is well-formed.
            unsafe { space.calloc(size, ARENA_ALIGN) }
        })
        .unwrap_or(ptr::null_mut())
    }

    /// Resize an arena allocation, preserving the common prefix.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this arena with size `old_size` and must not
    /// have been freed.
    pub unsafe fn realloc(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        self.with_space(|space| {
            // SAFETY: caller guarantees the provenance and size of `ptr`.
            unsafe { space.realloc(ptr, old_size, ARENA_ALIGN, new_size) }
        })
        .unwrap_or(ptr::null_mut())
    }

    /// Return an allocation to the arena.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this arena with size `size` and must not be
    /// freed twice.
    pub unsafe fn free(&self, ptr: *mut u8, size: usize) {
        let _ = self.with_space(|space| {
            // SAFETY: caller guarantees the provenance and size of `ptr`.
            unsafe { space.free(ptr, size, ARENA_ALIGN) }
        });
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
