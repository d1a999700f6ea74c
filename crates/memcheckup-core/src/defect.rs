//! Defect registry.
//!
//! A single linked list of deduplicated records. A record's identity is the
//! `(kind, allocation stack, deallocation stack)` triple, compared
//! slot-for-slot including zero padding. Unique signatures number in the
//! tens to low hundreds in practice, so a linear scan beats carrying a
//! second hash structure.

use core::mem;
use core::ptr;

use crate::arena::Arena;
use crate::stack::CallStack;

/// The closed set of defects the check-up reports. Declaration order is the
/// index printed in the report listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectKind {
    Leak,
    ReleaseOfUntracked,
    FamilyMismatch,
    NullRelease,
    ZeroSizedRequest,
    TailOverwrite,
}

impl DefectKind {
    /// Stable index used in the report listing.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Leak => "Memory Leak",
            Self::ReleaseOfUntracked => "Release Of Untracked Memory",
            Self::FamilyMismatch => "Mismatched Allocation/Release",
            Self::NullRelease => "Null Pointer Release",
            Self::ZeroSizedRequest => "Zero-Sized Request",
            Self::TailOverwrite => "Tail Overwrite",
        }
    }

    /// Whether the report prints the allocation stack for this kind.
    pub fn needs_allocation_stack(self) -> bool {
        matches!(
            self,
            Self::Leak | Self::ZeroSizedRequest | Self::FamilyMismatch | Self::TailOverwrite
        )
    }

    /// Whether the report prints the deallocation stack for this kind.
    pub fn needs_deallocation_stack(self) -> bool {
        matches!(
            self,
            Self::NullRelease
                | Self::ReleaseOfUntracked
                | Self::FamilyMismatch
                | Self::TailOverwrite
        )
    }
}

/// A deduplicated defect record. Lives in the arena, linked into the
/// registry.
#[repr(C)]
pub struct Defect {
    next: *mut Defect,
    pub kind: DefectKind,
    /// Most recent payload size involved (leaks only).
    pub size: usize,
    /// Occurrences carrying this exact signature.
    pub count: u64,
    /// Accumulated leaked bytes (leaks only).
    pub total_memory: u64,
    /// All-zero when not meaningful for the kind.
    pub allocation_stack: CallStack,
    /// All-zero when not meaningful for the kind.
    pub deallocation_stack: CallStack,
}

impl Defect {
    /// Plain-data copy for inspection callbacks.
    pub fn record(&self) -> DefectRecord {
        DefectRecord {
            kind: self.kind,
            size: self.size,
            count: self.count,
            total_memory: self.total_memory,
            allocation_stack: self.allocation_stack,
            deallocation_stack: self.deallocation_stack,
        }
    }
}

/// Caller-visible copy of a [`Defect`], detached from the registry.
#[derive(Debug, Clone, Copy)]
pub struct DefectRecord {
    pub kind: DefectKind,
    pub size: usize,
    pub count: u64,
    pub total_memory: u64,
    pub allocation_stack: CallStack,
    pub deallocation_stack: CallStack,
}

/// The process-wide list of unique defect signatures.
pub struct DefectRegistry {
    head: *mut Defect,
}

impl DefectRegistry {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    /// Locate the record with this exact signature, or null.
    pub fn find(
        &self,
        kind: DefectKind,
        allocation: &CallStack,
        deallocation: &CallStack,
    ) -> *mut Defect {
        let mut cur = self.head;
        // SAFETY: links point at live arena nodes or null.
        unsafe {
            while !cur.is_null() {
                if (*cur).kind == kind
                    && (*cur).allocation_stack == *allocation
                    && (*cur).deallocation_stack == *deallocation
                {
                    break;
                }
                cur = (*cur).next;
            }
        }
        cur
    }

    /// Find the matching record or prepend a fresh zero-count one. Null only
    /// when the arena cannot supply a node; the caller then drops the event.
    pub fn find_or_create(
        &mut self,
        arena: &Arena,
        kind: DefectKind,
        allocation: &CallStack,
        deallocation: &CallStack,
    ) -> *mut Defect {
        let found = self.find(kind, allocation, deallocation);
        if !found.is_null() {
            return found;
        }
        let node: *mut Defect = arena.alloc(mem::size_of::<Defect>()).cast();
        if node.is_null() {
            return node;
        }
        // SAFETY: `node` is a fresh arena allocation of Defect size.
        unsafe {
            node.write(Defect {
                next: self.head,
                kind,
                size: 0,
                count: 0,
                total_memory: 0,
                allocation_stack: *allocation,
                deallocation_stack: *deallocation,
            });
        }
        self.head = node;
        node
    }

    /// Visit every record in list order.
    pub fn for_each(&self, mut f: impl FnMut(&Defect)) {
        let mut cur = self.head;
        // SAFETY: links point at live arena nodes or null.
        unsafe {
            while !cur.is_null() {
                f(&*cur);
                cur = (*cur).next;
            }
        }
    }

    pub fn len(&self) -> usize {
        let mut count = 0;
        self.for_each(|_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Return every node to the arena.
    pub fn clear(&mut self, arena: &Arena) {
        let mut cur = self.head;
        // SAFETY: each node came from the arena and is visited once.
        unsafe {
            while !cur.is_null() {
                let next = (*cur).next;
                arena.free(cur.cast(), mem::size_of::<Defect>());
                cur = next;
            }
        }
        self.head = ptr::null_mut();
    }
}
