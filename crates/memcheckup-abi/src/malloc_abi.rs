//! C-family hooks: `malloc`, `free`, `realloc`, `calloc`.
//!
//! Compiled only under the `c-memory-check` feature. Pointer provenance in C
//! code is loose (allocations made before this library loaded are seen as
//! untracked on release), so defects reported through these hooks can be
//! false positives.

use std::ffi::c_void;
use std::ptr;

use memcheckup_core::{OperationKind, release, request};

/// `malloc(size)`.
///
/// # Safety
///
/// Standard `malloc` contract: the returned pointer must be released exactly
/// once through `free` (or recycled through `realloc`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    unsafe { request(OperationKind::AllocRaw, size, ptr::null_mut()).cast() }
}

/// `free(ptr)`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { release(OperationKind::FreeRaw, ptr.cast()) }
}

/// `realloc(ptr, size)`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks and not yet
/// released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { request(OperationKind::ReallocRaw, size, ptr.cast()).cast() }
}

/// `calloc(nmemb, size)`. Overflowing element counts fail with null before
/// reaching the engine.
///
/// # Safety
///
/// Standard `calloc` contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    let Some(total) = nmemb.checked_mul(size) else {
        return ptr::null_mut();
    };
    unsafe { request(OperationKind::AllocZeroed, total, ptr::null_mut()).cast() }
}
