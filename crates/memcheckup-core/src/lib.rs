//! # memcheckup-core
//!
//! Dynamic memory check-up engine. Together with the `memcheckup-abi` hook
//! crate it interposes on a process's dynamic memory operations to detect
//! leaks, mismatched allocation/release families, releases of untracked
//! memory, null releases, zero-sized requests, and linear overwrites past
//! the tail of a block. At shutdown it writes a human-readable report
//! (`memory_check_up.txt`) grouping defects by call-site signature.
//!
//! # Architecture
//!
//! - **Private arena** (`arena`): isolated dlmalloc heap for all bookkeeping
//! - **Stack capture** (`stack`): fixed-width instruction-pointer vectors
//! - **Live-block table** (`table`): fixed-bucket index keyed by user address
//! - **Defect registry** (`defect`): deduplicated defect records
//! - **Engine** (`engine`): request/release with canary and poison bytes
//! - **Report writer** (`report`): shutdown-time analyzer and formatter
//! - **Lifecycle** (`state`): bootstrap, flags, global lock, log stream
//!
//! The process-wide instance behind the hooks is [`state::CHECK_UP`];
//! harnesses and tests construct private [`CheckUp`] instances and drive
//! them through the same code paths.

pub mod arena;
pub mod defect;
pub mod engine;
pub mod log;
mod report;
pub mod stack;
pub mod state;
pub mod stats;
mod sync;
pub mod table;

pub use arena::{ARENA_ALIGN, Arena};
pub use defect::{DefectKind, DefectRecord};
pub use engine::{ALLOC_FILL, CANARY, FREE_FILL, release, request};
pub use log::{LOG_BUFFER_SIZE, LOG_PATH, LogTarget};
pub use stack::{CallStack, STACK_DEPTH};
pub use state::{CHECK_UP, CheckUp, init, shutdown};
pub use stats::{MemoryFamily, OperationKind, OperationStats};
pub use table::BUCKET_COUNT;
