//! Request/release engine.
//!
//! The interposition entry points. Every user block is allocated from the
//! private arena with four extra tail bytes carrying the canary; fresh
//! memory is filled with [`ALLOC_FILL`] (zeroed allocations excepted) and
//! released memory with [`FREE_FILL`], so stray reads of uninitialized or
//! freed bytes surface as obviously wrong values. Defects are recorded,
//! never raised: apart from the fills and the opt-in abort toggles, the
//! instrumented program observes nothing.

use core::ptr;
use core::slice;

use crate::defect::DefectKind;
use crate::stack::{self, NULL_STACK};
use crate::state::{CHECK_UP, CheckUp};
use crate::stats::OperationKind;

/// Four-byte sentinel stamped just past every user payload.
pub const CANARY: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];
/// Fill for freshly allocated bytes.
pub const ALLOC_FILL: u8 = 0xAA;
/// Fill applied to a block as it is released.
pub const FREE_FILL: u8 = 0xEE;

/// Service an allocation request through the process-wide check-up.
///
/// # Safety
///
/// For `ReallocRaw`, `old_ptr` must be null or a pointer previously returned
/// by this engine and not yet released. Other kinds ignore `old_ptr`.
pub unsafe fn request(kind: OperationKind, size: usize, old_ptr: *mut u8) -> *mut u8 {
    unsafe { CHECK_UP.request(kind, size, old_ptr) }
}

/// Service a release through the process-wide check-up.
///
/// # Safety
///
/// `user_ptr` must be null or a pointer previously returned by [`request`];
/// releasing it twice reports a defect rather than corrupting the arena.
pub unsafe fn release(kind: OperationKind, user_ptr: *mut u8) {
    unsafe { CHECK_UP.release(kind, user_ptr) }
}

impl CheckUp {
    /// Service one allocation request: zero-size policy, arena allocation,
    /// fill and canary stamping, realloc carry-over, registration.
    ///
    /// # Safety
    ///
    /// See [`request`].
    pub unsafe fn request(&self, kind: OperationKind, size: usize, old_ptr: *mut u8) -> *mut u8 {
        self.init();

        if size == 0 && kind.checks_zero_size() {
            let here = stack::capture();
            if self.tracing() {
                let _ = self.with_state(|arena, state| {
                    let defect = state.defects.find_or_create(
                        arena,
                        DefectKind::ZeroSizedRequest,
                        &here,
                        &NULL_STACK,
                    );
                    if !defect.is_null() {
                        // SAFETY: live registry node.
                        unsafe { (*defect).count += 1 };
                    }
                });
            }
            return ptr::null_mut();
        }

        // A realloc retires its old block up front: the free is credited
        // now, the payload is carried over once the new block exists.
        let mut old_size = 0usize;
        let mut had_old = false;
        if kind == OperationKind::ReallocRaw && !old_ptr.is_null() && self.tracing() {
            let _ = self.with_state(|arena, state| {
                let block = state.table.find(old_ptr as usize);
                if block.is_null() {
                    return;
                }
                // SAFETY: find returned a node linked in this table.
                unsafe {
                    old_size = (*block).size;
                    state.table.remove(arena, block);
                }
                had_old = true;
                state.stats.record_release(OperationKind::FreeRaw, old_size);
            });
        }

        let Some(total) = size.checked_add(CANARY.len()) else {
            return ptr::null_mut();
        };
        let raw = if kind == OperationKind::AllocZeroed {
            self.arena().alloc_zeroed(total)
        } else {
            let raw = self.arena().alloc(total);
            if !raw.is_null() {
                // SAFETY: `raw` is valid for `total` bytes.
                unsafe { ptr::write_bytes(raw, ALLOC_FILL, total) };
            }
            raw
        };
        if raw.is_null() {
            // Arena exhausted: no canary, no bookkeeping.
            return ptr::null_mut();
        }

        if had_old {
            // SAFETY: the old block still holds `old_size` valid bytes (it
            // is returned to the arena only below) and cannot overlap the
            // fresh allocation.
            unsafe { ptr::copy_nonoverlapping(old_ptr.cast_const(), raw, old_size.min(size)) };
        }
        // SAFETY: the canary region lies inside the `total`-byte block.
        unsafe { ptr::copy_nonoverlapping(CANARY.as_ptr(), raw.add(size), CANARY.len()) };
        if had_old {
            // SAFETY: the old block came from this arena with this extent.
            unsafe { self.arena().free(old_ptr, old_size + CANARY.len()) };
        }

        if self.tracing() {
            let site = stack::capture();
            let _ = self.with_state(|arena, state| {
                if state.table.insert(arena, raw as usize, size, kind, site) {
                    state.stats.record_request(kind, size);
                }
            });
        }
        raw
    }

    /// Service one release: canary check, poison fill, family check,
    /// removal. The canary check precedes the family check and both defects
    /// are reported when both fire; statistics are credited exactly once.
    ///
    /// # Safety
    ///
    /// See [`release`].
    pub unsafe fn release(&self, kind: OperationKind, user_ptr: *mut u8) {
        self.init();

        if user_ptr.is_null() {
            #[cfg(feature = "c-memory-check")]
            if kind == OperationKind::FreeRaw && self.tracing() {
                let here = stack::capture();
                let _ = self.with_state(|arena, state| {
                    let defect = state.defects.find_or_create(
                        arena,
                        DefectKind::NullRelease,
                        &NULL_STACK,
                        &here,
                    );
                    if !defect.is_null() {
                        // SAFETY: live registry node.
                        unsafe { (*defect).count += 1 };
                    }
                });
            }
            return;
        }

        let mut release_bytes = None;
        let mut fatal = None;
        if self.tracing() {
            let _ = self.with_state(|arena, state| {
                let block = state.table.find(user_ptr as usize);
                if block.is_null() {
                    // The pointer was never handed out by this engine (or
                    // points into the middle of a block). Reported, and the
                    // memory is deliberately not forwarded to the arena.
                    let here = stack::capture();
                    let defect = state.defects.find_or_create(
                        arena,
                        DefectKind::ReleaseOfUntracked,
                        &NULL_STACK,
                        &here,
                    );
                    if !defect.is_null() {
                        // SAFETY: live registry node.
                        unsafe { (*defect).count += 1 };
                    }
                    if cfg!(feature = "abort-on-untracked-release") {
                        fatal = Some("memcheckup: release of untracked memory\n");
                    }
                    return;
                }

                // SAFETY: find returned a node linked in this table.
                let (tracked_size, tracked_kind, tracked_stack) =
                    unsafe { ((*block).size, (*block).kind, (*block).stack) };
                state.stats.record_release(kind, tracked_size);

                // SAFETY: the block was allocated with a canary tail and is
                // still live.
                let tail = unsafe {
                    slice::from_raw_parts(user_ptr.add(tracked_size).cast_const(), CANARY.len())
                };
                if tail != CANARY {
                    let here = stack::capture();
                    let defect = state.defects.find_or_create(
                        arena,
                        DefectKind::TailOverwrite,
                        &tracked_stack,
                        &here,
                    );
                    if !defect.is_null() {
                        // SAFETY: live registry node.
                        unsafe { (*defect).count += 1 };
                    }
                    if cfg!(feature = "abort-on-tail-overwrite") {
                        fatal = Some("memcheckup: tail overwrite detected\n");
                    }
                }

                // SAFETY: same extent as the original allocation.
                unsafe { ptr::write_bytes(user_ptr, FREE_FILL, tracked_size + CANARY.len()) };

                if kind.mismatched_release_of(tracked_kind) {
                    let here = stack::capture();
                    let defect = state.defects.find_or_create(
                        arena,
                        DefectKind::FamilyMismatch,
                        &tracked_stack,
                        &here,
                    );
                    if !defect.is_null() {
                        // SAFETY: live registry node.
                        unsafe { (*defect).count += 1 };
                    }
                }

                // SAFETY: `block` is linked in this table.
                unsafe { state.table.remove(arena, block) };
                release_bytes = Some(tracked_size + CANARY.len());
            });
        }

        if let Some(message) = fatal {
            self.fail(message);
        }
        if let Some(total) = release_bytes {
            // SAFETY: a tracked block is by construction an arena allocation
            // of exactly this extent.
            unsafe { self.arena().free(user_ptr, total) };
        }
    }
}
