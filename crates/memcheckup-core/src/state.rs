//! Lifecycle controller and global state.
//!
//! Everything the check-up owns (flags, lock, arena, tracker, log) sits
//! behind one state object. The process-wide instance is [`CHECK_UP`];
//! harnesses and tests construct private instances and drive them through
//! the same code paths.
//!
//! Manual atomic flags are used instead of `OnceLock`: under interposition
//! the first allocation can arrive on any thread before module initializers
//! run, and a blocking once-cell deadlocks on same-thread reentrant
//! initialization (the stack-capture warm-up below can allocate through the
//! hooks).

use core::cell::UnsafeCell;
use core::fmt;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::arena::Arena;
use crate::defect::{DefectRecord, DefectRegistry};
use crate::log::{LogStream, LogTarget};
use crate::report;
use crate::stack;
use crate::stats::{MemoryFamily, OperationKind, OperationStats, StatsTable};
use crate::sync::HookMutex;
use crate::table::BlockTable;

/// Initialization has completed; hooks may consult the tracker.
const INITIALIZED: u8 = 0b0001;
/// Request/release bodies perform bookkeeping.
const TRACING: u8 = 0b0010;
/// Shutdown has run; the report is final.
const FINISHED: u8 = 0b0100;
/// A thread has claimed initialization under the lock.
const INIT_CLAIMED: u8 = 0b1000;

/// The bookkeeping half of a check-up, created at init and dropped at
/// shutdown. Only ever touched under the global lock.
pub(crate) struct CheckUpState {
    pub(crate) table: BlockTable,
    pub(crate) defects: DefectRegistry,
    pub(crate) stats: StatsTable,
    pub(crate) log: LogStream,
}

/// A complete dynamic memory check-up: lifecycle flags, global lock, private
/// arena, shadow bookkeeping, and log stream.
pub struct CheckUp {
    flags: AtomicU8,
    lock: HookMutex,
    arena: Arena,
    state: UnsafeCell<Option<CheckUpState>>,
}

// SAFETY: `state` is only touched under `lock`; the arena locks itself.
unsafe impl Sync for CheckUp {}

/// The process-wide check-up driven by the interposition hooks.
pub static CHECK_UP: CheckUp = CheckUp::new();

/// Idempotent initialization of the process-wide check-up. Hooks call this
/// on every entry because some platforms deliver allocation requests before
/// module initializers complete.
pub fn init() {
    CHECK_UP.init();
}

/// Disable tracing, fold residual blocks into leaks, and write the report.
/// Only the first call has any effect.
pub fn shutdown() {
    CHECK_UP.shutdown();
}

impl CheckUp {
    pub const fn new() -> Self {
        Self {
            flags: AtomicU8::new(0),
            lock: HookMutex::new(),
            arena: Arena::new(),
            state: UnsafeCell::new(None),
        }
    }

    fn flag(&self, flag: u8) -> bool {
        self.flags.load(Ordering::Acquire) & flag != 0
    }

    /// Whether request/release bodies currently perform bookkeeping. Read
    /// without the lock; it only changes at the end of init and the start of
    /// shutdown.
    pub fn tracing(&self) -> bool {
        self.flag(TRACING)
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Initialize against the default log target.
    pub fn init(&self) {
        self.init_with(LogTarget::File);
    }

    /// Idempotent initialization. Safe to call from any hook at any time.
    pub fn init_with(&self, target: LogTarget) {
        if self.flag(INITIALIZED) {
            return;
        }
        let _guard = self.lock.guard();
        if self.flag(INITIALIZED) {
            return;
        }
        if self.flags.fetch_or(INIT_CLAIMED, Ordering::AcqRel) & INIT_CLAIMED != 0 {
            // The claim is taken under the lock, so this is only reachable
            // when a previous initializer died mid-flight.
            fatal_to_stdout("memcheckup: initialization raced or previously failed\n");
        }

        self.arena.create();
        // From here on, reentrant hook calls (the warm-up below may
        // allocate through the unwinder) see INITIALIZED, skip init, and
        // bypass bookkeeping because tracing is still off.
        self.flags.fetch_or(INITIALIZED, Ordering::Release);
        stack::warm_up();

        let Some(table) = BlockTable::new(&self.arena) else {
            fatal_to_stdout("memcheckup: unable to allocate the live-block table\n");
        };
        let mut log = LogStream::open(target);
        let _ = writeln!(log, "memcheckup started");

        // SAFETY: exclusive access under the lock.
        unsafe {
            *self.state.get() = Some(CheckUpState {
                table,
                defects: DefectRegistry::new(),
                stats: StatsTable::new(),
                log,
            });
        }
        self.flags.fetch_or(TRACING, Ordering::Release);
    }

    /// Disable tracing, run the analyzer, write the report to the log, and
    /// drop the bookkeeping. Runs once; later calls are no-ops.
    pub fn shutdown(&self) {
        self.shutdown_with(None);
    }

    /// Like [`CheckUp::shutdown`] but renders the report into `out` instead
    /// of the log stream. Harness and test entry point.
    pub fn finish_to<W: fmt::Write>(&self, out: &mut W) {
        self.shutdown_with(Some(out));
    }

    fn shutdown_with(&self, sink: Option<&mut dyn fmt::Write>) {
        if self.flag(FINISHED) {
            return;
        }
        let retired = {
            let _guard = self.lock.guard();
            if self.flag(FINISHED) {
                return;
            }
            self.flags.fetch_and(!TRACING, Ordering::AcqRel);
            // SAFETY: exclusive access under the lock.
            let slot = unsafe { &mut *self.state.get() };
            if let Some(state) = slot.as_mut() {
                report::synthesize_leaks(&self.arena, &state.table, &mut state.defects);
                let _ = match sink {
                    Some(out) => report::write_report(out, &state.stats, &state.defects),
                    None => report::write_report(&mut state.log, &state.stats, &state.defects),
                };
                state.table.clear(&self.arena);
                state.defects.clear(&self.arena);
            }
            slot.take()
        };
        // The log flushes and closes outside the lock.
        drop(retired);
        self.flags.fetch_or(FINISHED, Ordering::Release);
    }

    /// Abort path for the `abort-on-*` toggles: write the message, run the
    /// normal shutdown so the report survives, then kill the process.
    pub(crate) fn fail(&self, message: &str) -> ! {
        {
            let _guard = self.lock.guard();
            // SAFETY: exclusive access under the lock.
            if let Some(state) = unsafe { &mut *self.state.get() }.as_mut() {
                let _ = state.log.write_str(message);
            }
        }
        self.shutdown();
        std::process::abort();
    }

    /// Run `f` on the live tracker under the lock. `None` before init or
    /// after shutdown.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&Arena, &mut CheckUpState) -> R) -> Option<R> {
        let _guard = self.lock.guard();
        // SAFETY: exclusive access under the lock.
        let slot = unsafe { &mut *self.state.get() };
        slot.as_mut().map(|state| f(&self.arena, state))
    }

    /// Number of currently tracked allocations.
    pub fn live_blocks(&self) -> usize {
        self.with_state(|_, state| state.table.len()).unwrap_or(0)
    }

    /// Counters for one operation kind.
    pub fn operation_stats(&self, kind: OperationKind) -> OperationStats {
        self.with_state(|_, state| state.stats.get(kind))
            .unwrap_or_default()
    }

    /// Outstanding `(events, bytes)` for one pairing family.
    pub fn balance(&self, family: MemoryFamily) -> (i64, i64) {
        self.with_state(|_, state| state.stats.balance(family))
            .unwrap_or((0, 0))
    }

    /// Visit a plain-data copy of every registered defect. The global lock
    /// is held for the duration; the callback must not call back into this
    /// check-up.
    pub fn for_each_defect(&self, mut f: impl FnMut(&DefectRecord)) {
        let _ = self.with_state(|_, state| {
            state.defects.for_each(|defect| f(&defect.record()));
        });
    }
}

impl Default for CheckUp {
    fn default() -> Self {
        Self::new()
    }
}

/// Last-resort exit for states the check-up cannot recover from.
fn fatal_to_stdout(message: &str) -> ! {
    // SAFETY: writing a valid buffer to standard output.
    unsafe { libc::write(libc::STDOUT_FILENO, message.as_ptr().cast(), message.len()) };
    std::process::abort()
}
