//! End-of-life analyzer and report writer.
//!
//! Runs once, during shutdown, after tracing is disabled: folds residual
//! live blocks into leak defects, then renders the operation table, the
//! family balance summary, and the problem listing.

use core::fmt;

use crate::arena::Arena;
use crate::defect::{DefectKind, DefectRegistry};
use crate::stack::NULL_STACK;
use crate::stats::{MemoryFamily, OperationKind, StatsTable};
use crate::table::BlockTable;

const BANNER: &str = "----------------------------------------------------------------";

/// Fold every residual live block into the registry as a leak keyed by its
/// allocation stack. `size` keeps the most recent block's payload
/// (last-writer-wins); `total_memory` accumulates across the group.
pub(crate) fn synthesize_leaks(arena: &Arena, table: &BlockTable, defects: &mut DefectRegistry) {
    table.for_each(|block| {
        let defect = defects.find_or_create(arena, DefectKind::Leak, &block.stack, &NULL_STACK);
        if defect.is_null() {
            return;
        }
        // SAFETY: find_or_create returned a live registry node.
        unsafe {
            (*defect).count += 1;
            (*defect).size = block.size;
            (*defect).total_memory += block.size as u64;
        }
    });
}

/// Render the full report into `out`.
pub(crate) fn write_report<W: fmt::Write + ?Sized>(
    out: &mut W,
    stats: &StatsTable,
    defects: &DefectRegistry,
) -> fmt::Result {
    writeln!(out, "memcheckup memory report")?;
    writeln!(out, "{BANNER}")?;
    writeln!(
        out,
        "{:>15} {:>15} {:>15} {:>15}",
        "->", "operations", "total mem", "max value"
    )?;
    for kind in OperationKind::ALL {
        if kind.is_c_family() && !cfg!(feature = "c-memory-check") {
            continue;
        }
        let entry = stats.get(kind);
        writeln!(
            out,
            "{:>15} {:>15} {:>15} {:>15}",
            kind.label(),
            entry.count,
            entry.total_bytes,
            entry.max_single_bytes
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Dynamic Memory Balance")?;
    writeln!(out, "{BANNER}")?;
    for family in MemoryFamily::ALL {
        if family == MemoryFamily::CMemory && !cfg!(feature = "c-memory-check") {
            continue;
        }
        let (count, bytes) = stats.balance(family);
        writeln!(out, "{:>15} {:>15} {:>15}", family.label(), count, bytes)?;
    }

    writeln!(out)?;
    writeln!(out, "Problems")?;
    writeln!(out, "{BANNER}")?;

    let mut status = Ok(());
    defects.for_each(|defect| {
        if status.is_err() {
            return;
        }
        status = (|| {
            writeln!(out, "{{")?;
            writeln!(out, "[{}] {}", defect.kind.index(), defect.kind.label())?;
            writeln!(out, "Count: {}", defect.count)?;
            if defect.kind == DefectKind::Leak {
                writeln!(out, "Total Memory Lost: {}", defect.total_memory)?;
            }
            if defect.kind.needs_allocation_stack() {
                write!(out, "Allocation Stack:")?;
                for frame in defect.allocation_stack.iter().filter(|frame| **frame != 0) {
                    write!(out, " {frame:#x}")?;
                }
                writeln!(out)?;
            }
            if defect.kind.needs_deallocation_stack() {
                write!(out, "Deallocation Stack:")?;
                for frame in defect
                    .deallocation_stack
                    .iter()
                    .filter(|frame| **frame != 0)
                {
                    write!(out, " {frame:#x}")?;
                }
                writeln!(out)?;
            }
            writeln!(out, "}}")
        })();
    });
    status
}
