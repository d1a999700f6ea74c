//! # memcheckup-abi
//!
//! Interposition boundary for the dynamic memory check-up. This crate
//! produces a `cdylib` whose exported symbols shadow the standard allocation
//! entry points; each hook tags the call with an operation kind and
//! delegates to the engine in `memcheckup-core`. The hooks themselves
//! contain no logic.
//!
//! ```text
//! program call -> hook (this crate) -> engine request/release -> arena
//! ```
//!
//! Load the library ahead of the target (static link order or `LD_PRELOAD`)
//! and the check-up report lands in `memory_check_up.txt` at exit.

// Gated behind cfg(not(test)) because these modules export symbols
// (malloc, free, operator new, ...) that would shadow the system allocator
// in the test binary, causing infinite recursion or deadlock.
#[cfg(not(test))]
mod bootstrap;
#[cfg(not(test))]
pub mod cxx_abi;
#[cfg(all(not(test), feature = "c-memory-check"))]
pub mod malloc_abi;
