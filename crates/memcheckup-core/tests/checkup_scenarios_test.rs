//! End-to-end scenarios driven through a private check-up instance: matched
//! pairs, leak folding, family mismatches, untracked releases, zero-sized
//! requests, tail overwrites, and the realloc carry-over.

use core::ptr;

use memcheckup_core::{CheckUp, DefectKind, DefectRecord, LogTarget, MemoryFamily, OperationKind};

fn fresh() -> CheckUp {
    let checkup = CheckUp::new();
    checkup.init_with(LogTarget::Discard);
    checkup
}

fn collect_defects(checkup: &CheckUp) -> Vec<DefectRecord> {
    let mut defects = Vec::new();
    checkup.for_each_defect(|defect| defects.push(*defect));
    defects
}

#[inline(never)]
fn lose_array(checkup: &CheckUp, size: usize) {
    // Allocate and retain: never released, so it must surface as a leak.
    // SAFETY: a plain allocation request.
    let ptr = unsafe { checkup.request(OperationKind::AllocObjectArray, size, ptr::null_mut()) };
    assert!(!ptr.is_null());
}

#[inline(never)]
fn ask_zero(checkup: &CheckUp, kind: OperationKind) -> *mut u8 {
    // SAFETY: a plain allocation request.
    unsafe { checkup.request(kind, 0, ptr::null_mut()) }
}

#[test]
fn matched_pairs_leave_no_defects_and_zero_balances() {
    let checkup = fresh();
    // SAFETY: matched request/release pairs on engine-owned pointers.
    unsafe {
        let a = checkup.request(OperationKind::AllocObjectArray, 1, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObjectArray, a);
        let b = checkup.request(OperationKind::AllocObject, 4, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObject, b);
        let c = checkup.request(OperationKind::AllocObject, 8, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObject, c);
    }

    assert!(collect_defects(&checkup).is_empty());
    assert_eq!(checkup.live_blocks(), 0);
    assert_eq!(checkup.balance(MemoryFamily::Object), (0, 0));
    assert_eq!(checkup.balance(MemoryFamily::ObjectArray), (0, 0));

    let mut report = String::new();
    checkup.finish_to(&mut report);
    let object_row: Vec<&str> = report
        .lines()
        .find(|line| line.trim_start().starts_with("new/delete"))
        .expect("object balance row")
        .split_whitespace()
        .collect();
    assert_eq!(object_row, ["new/delete", "0", "0"]);
}

#[test]
fn repeated_losses_from_one_site_fold_into_one_leak() {
    let checkup = fresh();
    for i in 0..5 {
        lose_array(&checkup, 10 + i);
    }
    assert_eq!(checkup.live_blocks(), 5);

    let mut report = String::new();
    checkup.finish_to(&mut report);
    assert_eq!(report.matches("[0] Memory Leak").count(), 1);
    assert!(report.contains("Count: 5"));
    assert!(report.contains("Total Memory Lost: 60"));
    assert!(report.contains("Allocation Stack: 0x"));
    assert!(!report.contains("Deallocation Stack:"));
}

#[test]
fn cross_family_releases_each_raise_one_mismatch() {
    let checkup = fresh();
    // SAFETY: releases use engine-owned pointers, just the wrong kinds.
    unsafe {
        let a = checkup.request(OperationKind::AllocObjectArray, 1, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObject, a);
        let b = checkup.request(OperationKind::AllocObject, 4, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObjectArray, b);
        let c = checkup.request(OperationKind::AllocObject, 8, ptr::null_mut());
        checkup.release(OperationKind::FreeRaw, c);
    }

    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 3);
    for defect in &defects {
        assert_eq!(defect.kind, DefectKind::FamilyMismatch);
        assert_eq!(defect.count, 1);
        assert!(defect.allocation_stack.iter().any(|frame| *frame != 0));
        assert!(defect.deallocation_stack.iter().any(|frame| *frame != 0));
    }
    assert_eq!(checkup.live_blocks(), 0);
}

#[test]
fn matched_raw_family_accepts_all_three_allocators() {
    let checkup = fresh();
    // SAFETY: matched request/release pairs on engine-owned pointers.
    unsafe {
        let a = checkup.request(OperationKind::AllocRaw, 4, ptr::null_mut());
        checkup.release(OperationKind::FreeRaw, a);
        let b = checkup.request(OperationKind::AllocZeroed, 4000, ptr::null_mut());
        checkup.release(OperationKind::FreeRaw, b);
        let c = checkup.request(OperationKind::AllocRaw, 4, ptr::null_mut());
        let d = checkup.request(OperationKind::ReallocRaw, 16, c);
        checkup.release(OperationKind::FreeRaw, d);
    }
    assert!(collect_defects(&checkup).is_empty());
    assert_eq!(checkup.balance(MemoryFamily::CMemory), (0, 0));
}

#[test]
fn releases_of_unknown_pointers_are_reported_and_the_block_leaks() {
    let checkup = fresh();
    let mut local = 0u64;
    // SAFETY: the untracked pointers are only reported, never freed.
    unsafe {
        let p = checkup.request(OperationKind::AllocObjectArray, 3, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObjectArray, p.add(1));
        checkup.release(OperationKind::FreeRaw, (&raw mut local).cast());
    }

    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 2);
    for defect in &defects {
        assert_eq!(defect.kind, DefectKind::ReleaseOfUntracked);
        assert_eq!(defect.count, 1);
        assert!(defect.allocation_stack.iter().all(|frame| *frame == 0));
    }
    // The original allocation was never properly released.
    assert_eq!(checkup.live_blocks(), 1);

    let mut report = String::new();
    checkup.finish_to(&mut report);
    assert!(report.contains("[0] Memory Leak"));
    assert!(report.contains("[1] Release Of Untracked Memory"));
}

#[test]
fn repeated_double_frees_from_one_site_share_one_record() {
    let checkup = fresh();
    // SAFETY: the pointer is engine-owned for the first release; later
    // releases are misses that only touch the registry.
    unsafe {
        let p = checkup.request(OperationKind::AllocObject, 8, ptr::null_mut());
        for _ in 0..3 {
            checkup.release(OperationKind::ReleaseObject, p);
        }
    }
    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 1);
    assert_eq!(defects[0].kind, DefectKind::ReleaseOfUntracked);
    assert_eq!(defects[0].count, 2);
}

#[test]
fn zero_sized_requests_return_null_and_aggregate_per_site() {
    let checkup = fresh();
    for _ in 0..4 {
        assert!(ask_zero(&checkup, OperationKind::AllocObjectArray).is_null());
    }
    assert!(ask_zero(&checkup, OperationKind::AllocRaw).is_null());
    assert!(ask_zero(&checkup, OperationKind::AllocZeroed).is_null());

    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 3);
    let mut counts: Vec<u64> = defects
        .iter()
        .map(|defect| {
            assert_eq!(defect.kind, DefectKind::ZeroSizedRequest);
            assert!(defect.deallocation_stack.iter().all(|frame| *frame == 0));
            defect.count
        })
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, [1, 1, 4]);
    assert_eq!(checkup.live_blocks(), 0);
}

#[test]
fn zero_sized_realloc_is_a_legitimate_shrink() {
    let checkup = fresh();
    // SAFETY: matched raw-family operations on engine-owned pointers.
    unsafe {
        let p = checkup.request(OperationKind::AllocRaw, 64, ptr::null_mut());
        let q = checkup.request(OperationKind::ReallocRaw, 0, p);
        assert!(!q.is_null());
        checkup.release(OperationKind::FreeRaw, q);
    }
    assert!(collect_defects(&checkup).is_empty());
}

#[test]
fn a_write_past_the_payload_trips_the_tail_canary() {
    let checkup = fresh();
    // SAFETY: the stray byte lands in the canary region, which the engine
    // owns.
    unsafe {
        let p = checkup.request(OperationKind::AllocObjectArray, 4, ptr::null_mut());
        p.add(4).write(b'k');
        checkup.release(OperationKind::ReleaseObjectArray, p);
    }

    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 1);
    assert_eq!(defects[0].kind, DefectKind::TailOverwrite);
    assert_eq!(defects[0].count, 1);
    assert!(defects[0].allocation_stack.iter().any(|frame| *frame != 0));
    assert!(defects[0].deallocation_stack.iter().any(|frame| *frame != 0));
}

#[test]
fn an_in_bounds_write_leaves_the_canary_alone() {
    let checkup = fresh();
    // SAFETY: writes stay inside the payload.
    unsafe {
        let p = checkup.request(OperationKind::AllocObjectArray, 4, ptr::null_mut());
        for i in 0..4 {
            p.add(i).write(0xFF);
        }
        checkup.release(OperationKind::ReleaseObjectArray, p);
    }
    assert!(collect_defects(&checkup).is_empty());
}

#[test]
fn realloc_preserves_the_payload_prefix_and_retargets_tracking() {
    let checkup = fresh();
    // SAFETY: raw-family operations on engine-owned pointers.
    unsafe {
        let p = checkup.request(OperationKind::AllocRaw, 16, ptr::null_mut());
        for i in 0..16 {
            p.add(i).write(i as u8);
        }

        let q = checkup.request(OperationKind::ReallocRaw, 32, p);
        assert!(!q.is_null());
        for i in 0..16 {
            assert_eq!(q.add(i).read(), i as u8);
        }
        assert_eq!(checkup.live_blocks(), 1);

        // The retirement of the old block was credited as a free.
        let frees = checkup.operation_stats(OperationKind::FreeRaw);
        assert_eq!(frees.count, 1);
        assert_eq!(frees.total_bytes, 16);
        let reallocs = checkup.operation_stats(OperationKind::ReallocRaw);
        assert_eq!(reallocs.count, 1);
        assert_eq!(reallocs.total_bytes, 32);

        // Shrinking keeps only the prefix that fits.
        let r = checkup.request(OperationKind::ReallocRaw, 8, q);
        assert!(!r.is_null());
        for i in 0..8 {
            assert_eq!(r.add(i).read(), i as u8);
        }
        assert_eq!(checkup.live_blocks(), 1);

        checkup.release(OperationKind::FreeRaw, r);
    }
    assert!(collect_defects(&checkup).is_empty());
    assert_eq!(checkup.live_blocks(), 0);
}

#[test]
fn null_releases_of_object_kinds_are_ignored() {
    let checkup = fresh();
    // SAFETY: null releases are defined no-ops.
    unsafe {
        checkup.release(OperationKind::ReleaseObject, ptr::null_mut());
        checkup.release(OperationKind::ReleaseObjectArray, ptr::null_mut());
    }
    assert!(collect_defects(&checkup).is_empty());
    assert_eq!(
        checkup.operation_stats(OperationKind::ReleaseObject).count,
        0
    );
}

#[cfg(feature = "c-memory-check")]
#[test]
fn null_frees_aggregate_per_call_site() {
    let checkup = fresh();
    for _ in 0..2 {
        // SAFETY: null releases are defined no-ops.
        unsafe { checkup.release(OperationKind::FreeRaw, ptr::null_mut()) };
    }
    let defects = collect_defects(&checkup);
    assert_eq!(defects.len(), 1);
    assert_eq!(defects[0].kind, DefectKind::NullRelease);
    assert_eq!(defects[0].count, 2);
    assert!(defects[0].allocation_stack.iter().all(|frame| *frame == 0));
    assert!(defects[0].deallocation_stack.iter().any(|frame| *frame != 0));
}

#[cfg(not(feature = "c-memory-check"))]
#[test]
fn null_frees_are_silent_without_the_c_check() {
    let checkup = fresh();
    // SAFETY: null releases are defined no-ops.
    unsafe { checkup.release(OperationKind::FreeRaw, ptr::null_mut()) };
    assert!(collect_defects(&checkup).is_empty());
}

#[test]
fn statistics_track_counts_totals_and_maxima() {
    let checkup = fresh();
    // SAFETY: plain requests; the blocks are deliberately retained.
    unsafe {
        checkup.request(OperationKind::AllocObject, 16, ptr::null_mut());
        checkup.request(OperationKind::AllocObject, 64, ptr::null_mut());
        checkup.request(OperationKind::AllocObject, 8, ptr::null_mut());
    }
    let stats = checkup.operation_stats(OperationKind::AllocObject);
    assert_eq!(stats.count, 3);
    assert_eq!(stats.total_bytes, 88);
    assert_eq!(stats.max_single_bytes, 64);
    assert_eq!(checkup.balance(MemoryFamily::Object), (3, 88));
}

#[test]
fn the_report_freezes_at_shutdown() {
    let checkup = fresh();
    assert!(ask_zero(&checkup, OperationKind::AllocObject).is_null());
    let mut report = String::new();
    checkup.finish_to(&mut report);
    assert!(report.contains("[4] Zero-Sized Request"));
    assert!(!checkup.tracing());

    // The engine still serves memory, but nothing mutates the registry.
    // SAFETY: a plain request/release pair after shutdown.
    unsafe {
        let p = checkup.request(OperationKind::AllocObject, 24, ptr::null_mut());
        assert!(!p.is_null());
        checkup.release(OperationKind::ReleaseObject, p);
    }
    assert_eq!(checkup.live_blocks(), 0);
    let mut second = String::new();
    checkup.finish_to(&mut second);
    assert!(second.is_empty());
}
