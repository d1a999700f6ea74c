//! Live-block table.
//!
//! Fixed-size open chaining keyed by user address. Prepend plus linear scan
//! favors the roughly stack-like arrival and departure order of real
//! programs: recently inserted entries are found fastest. There is no
//! resize; collision chains are accepted at ~35k buckets. Bucket heads and
//! nodes both live in the private arena.

use core::mem;
use core::ptr;

use crate::arena::Arena;
use crate::stack::CallStack;
use crate::stats::OperationKind;

/// Bucket count. Prime, sized once for the expected workload.
pub const BUCKET_COUNT: usize = 35_323;

/// A currently-outstanding user allocation.
#[repr(C)]
pub struct LiveBlock {
    next: *mut LiveBlock,
    /// User-visible address; the unique key.
    pub address: usize,
    /// Requested payload size in bytes, canary excluded.
    pub size: usize,
    /// Operation kind that created the block.
    pub kind: OperationKind,
    /// Capture of the allocating call site.
    pub stack: CallStack,
}

/// Shadow index of live allocations, keyed by user address.
pub struct BlockTable {
    buckets: *mut *mut LiveBlock,
}

impl BlockTable {
    /// Allocate the bucket array from the arena. `None` when the arena
    /// cannot supply it.
    pub fn new(arena: &Arena) -> Option<Self> {
        let buckets = arena.alloc_zeroed(BUCKET_COUNT * mem::size_of::<*mut LiveBlock>());
        if buckets.is_null() {
            return None;
        }
        Some(Self {
            buckets: buckets.cast(),
        })
    }

    fn bucket(&self, address: usize) -> *mut *mut LiveBlock {
        // SAFETY: the array holds BUCKET_COUNT heads and the index is
        // reduced modulo BUCKET_COUNT.
        unsafe { self.buckets.add(address % BUCKET_COUNT) }
    }

    /// Track a new allocation. Returns false when the arena cannot supply a
    /// node; the event then goes unrecorded.
    pub fn insert(
        &mut self,
        arena: &Arena,
        address: usize,
        size: usize,
        kind: OperationKind,
        stack: CallStack,
    ) -> bool {
        if self.buckets.is_null() {
            return false;
        }
        let node: *mut LiveBlock = arena.alloc(mem::size_of::<LiveBlock>()).cast();
        if node.is_null() {
            return false;
        }
        let head = self.bucket(address);
        // SAFETY: `node` is a fresh arena allocation of LiveBlock size and
        // `head` is a valid bucket slot.
        unsafe {
            node.write(LiveBlock {
                next: *head,
                address,
                size,
                kind,
                stack,
            });
            *head = node;
        }
        true
    }

    /// Exact-address lookup. Null when the address is not tracked.
    pub fn find(&self, address: usize) -> *mut LiveBlock {
        if self.buckets.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: bucket heads and links point at live nodes or null.
        unsafe {
            let mut cur = *self.bucket(address);
            while !cur.is_null() && (*cur).address != address {
                cur = (*cur).next;
            }
            cur
        }
    }

    /// Unlink `block` and return its node to the arena.
    ///
    /// # Safety
    ///
    /// `block` must be a node currently linked in this table.
    pub unsafe fn remove(&mut self, arena: &Arena, block: *mut LiveBlock) {
        // SAFETY: per the contract, `block` is linked under its address
        // bucket; the walk only follows live links.
        unsafe {
            let mut cur = self.bucket((*block).address);
            while !(*cur).is_null() && *cur != block {
                cur = &raw mut (**cur).next;
            }
            if !(*cur).is_null() {
                *cur = (*block).next;
                arena.free(block.cast(), mem::size_of::<LiveBlock>());
            }
        }
    }

    /// Visit every live block, in bucket order.
    pub fn for_each(&self, mut f: impl FnMut(&LiveBlock)) {
        if self.buckets.is_null() {
            return;
        }
        for index in 0..BUCKET_COUNT {
            // SAFETY: `index` is in range; links point at live nodes or null.
            unsafe {
                let mut cur = *self.buckets.add(index);
                while !cur.is_null() {
                    f(&*cur);
                    cur = (*cur).next;
                }
            }
        }
    }

    /// Number of live blocks. Full bucket walk; inspection path only.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.for_each(|_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free every node and the bucket array itself.
    pub fn clear(&mut self, arena: &Arena) {
        if self.buckets.is_null() {
            return;
        }
        for index in 0..BUCKET_COUNT {
            // SAFETY: `index` is in range; each node came from the arena.
            unsafe {
                let mut cur = *self.buckets.add(index);
                while !cur.is_null() {
                    let next = (*cur).next;
                    arena.free(cur.cast(), mem::size_of::<LiveBlock>());
                    cur = next;
                }
            }
        }
        // SAFETY: the array was allocated from this arena with this size.
        unsafe {
            arena.free(
                self.buckets.cast(),
                BUCKET_COUNT * mem::size_of::<*mut LiveBlock>(),
            );
        }
        self.buckets = ptr::null_mut();
    }
}
