//! Object-family hooks: C++ `operator new`/`delete` and their array forms.
//!
//! Exported under the Itanium LP64 mangled names (`unsigned long` size
//! parameter), so they capture scalar and array allocations of any C++
//! translation unit linked or preloaded against this library. The C++14
//! sized-deallocation variants forward to the same release paths; the size
//! argument is ignored because the engine tracks the real payload size
//! itself.

use std::ffi::c_void;
use std::ptr;

use memcheckup_core::{OperationKind, release, request};

/// `operator new(size_t)`, mangled `_Znwm`.
///
/// # Safety
///
/// Standard operator-new contract; the result must go back through
/// `operator delete`.
#[unsafe(export_name = "_Znwm")]
pub unsafe extern "C" fn operator_new(size: usize) -> *mut c_void {
    unsafe { request(OperationKind::AllocObject, size, ptr::null_mut()).cast() }
}

/// `operator new[](size_t)`, mangled `_Znam`.
///
/// # Safety
///
/// Standard operator-new[] contract; the result must go back through
/// `operator delete[]`.
#[unsafe(export_name = "_Znam")]
pub unsafe extern "C" fn operator_new_array(size: usize) -> *mut c_void {
    unsafe { request(OperationKind::AllocObjectArray, size, ptr::null_mut()).cast() }
}

/// `operator delete(void*)`, mangled `_ZdlPv`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks.
#[unsafe(export_name = "_ZdlPv")]
pub unsafe extern "C" fn operator_delete(ptr: *mut c_void) {
    unsafe { release(OperationKind::ReleaseObject, ptr.cast()) }
}

/// `operator delete[](void*)`, mangled `_ZdaPv`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks.
#[unsafe(export_name = "_ZdaPv")]
pub unsafe extern "C" fn operator_delete_array(ptr: *mut c_void) {
    unsafe { release(OperationKind::ReleaseObjectArray, ptr.cast()) }
}

/// `operator delete(void*, size_t)`, mangled `_ZdlPvm`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks.
#[unsafe(export_name = "_ZdlPvm")]
pub unsafe extern "C" fn operator_delete_sized(ptr: *mut c_void, _size: usize) {
    unsafe { release(OperationKind::ReleaseObject, ptr.cast()) }
}

/// `operator delete[](void*, size_t)`, mangled `_ZdaPvm`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from these hooks.
#[unsafe(export_name = "_ZdaPvm")]
pub unsafe extern "C" fn operator_delete_array_sized(ptr: *mut c_void, _size: usize) {
    unsafe { release(OperationKind::ReleaseObjectArray, ptr.cast()) }
}
