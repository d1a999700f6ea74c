//! Operation kinds, per-kind counters, and family pairing rules.

/// Number of interposed operation kinds.
pub const OPERATION_KIND_COUNT: usize = 8;

/// The eight interposed operations. The first four are the C family; the
/// scalar-object and array families follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    AllocRaw,
    FreeRaw,
    ReallocRaw,
    AllocZeroed,
    AllocObject,
    ReleaseObject,
    AllocObjectArray,
    ReleaseObjectArray,
}

impl OperationKind {
    /// Declaration order; also the report row order.
    pub const ALL: [Self; OPERATION_KIND_COUNT] = [
        Self::AllocRaw,
        Self::FreeRaw,
        Self::ReallocRaw,
        Self::AllocZeroed,
        Self::AllocObject,
        Self::ReleaseObject,
        Self::AllocObjectArray,
        Self::ReleaseObjectArray,
    ];

    /// Symbol name shown in the report's operation table.
    pub fn label(self) -> &'static str {
        match self {
            Self::AllocRaw => "malloc",
            Self::FreeRaw => "free",
            Self::ReallocRaw => "realloc",
            Self::AllocZeroed => "calloc",
            Self::AllocObject => "new",
            Self::ReleaseObject => "delete",
            Self::AllocObjectArray => "new[]",
            Self::ReleaseObjectArray => "delete[]",
        }
    }

    pub fn is_c_family(self) -> bool {
        matches!(
            self,
            Self::AllocRaw | Self::FreeRaw | Self::ReallocRaw | Self::AllocZeroed
        )
    }

    /// Kinds whose zero-sized requests are themselves a defect. A zero-size
    /// realloc is a legitimate shrink-to-nothing and is exempt.
    pub(crate) fn checks_zero_size(self) -> bool {
        matches!(
            self,
            Self::AllocRaw | Self::AllocZeroed | Self::AllocObject | Self::AllocObjectArray
        )
    }

    /// True when using `self` to release a block created by `allocated`
    /// crosses family lines. Kinds that are not releases never match.
    pub fn mismatched_release_of(self, allocated: OperationKind) -> bool {
        match self {
            Self::FreeRaw => !matches!(
                allocated,
                Self::AllocRaw | Self::AllocZeroed | Self::ReallocRaw
            ),
            Self::ReleaseObject => allocated != Self::AllocObject,
            Self::ReleaseObjectArray => allocated != Self::AllocObjectArray,
            _ => true,
        }
    }
}

/// Per-operation counters: events, bytes moved, largest single request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationStats {
    pub count: u64,
    pub total_bytes: u64,
    pub max_single_bytes: u64,
}

/// Counter table indexed by operation kind.
pub struct StatsTable {
    entries: [OperationStats; OPERATION_KIND_COUNT],
}

impl StatsTable {
    pub const fn new() -> Self {
        Self {
            entries: [OperationStats {
                count: 0,
                total_bytes: 0,
                max_single_bytes: 0,
            }; OPERATION_KIND_COUNT],
        }
    }

    pub fn get(&self, kind: OperationKind) -> OperationStats {
        self.entries[kind as usize]
    }

    /// Credit an allocation event with its requested payload size.
    pub fn record_request(&mut self, kind: OperationKind, size: usize) {
        let entry = &mut self.entries[kind as usize];
        entry.count += 1;
        entry.total_bytes += size as u64;
        if size as u64 > entry.max_single_bytes {
            entry.max_single_bytes = size as u64;
        }
    }

    /// Credit a release event with the tracked payload size.
    pub fn record_release(&mut self, kind: OperationKind, size: usize) {
        let entry = &mut self.entries[kind as usize];
        entry.count += 1;
        entry.total_bytes += size as u64;
    }

    /// Outstanding `(events, bytes)` for one family. Non-zero balances mean
    /// leaks, modulo the realloc convention: a realloc credits both a free
    /// and an allocation for the same event.
    pub fn balance(&self, family: MemoryFamily) -> (i64, i64) {
        let sum = |kinds: &[OperationKind]| {
            kinds.iter().fold((0i64, 0i64), |(count, bytes), kind| {
                let entry = self.get(*kind);
                (count + entry.count as i64, bytes + entry.total_bytes as i64)
            })
        };
        let (plus, minus) = match family {
            MemoryFamily::CMemory => (
                sum(&[
                    OperationKind::AllocRaw,
                    OperationKind::ReallocRaw,
                    OperationKind::AllocZeroed,
                ]),
                sum(&[OperationKind::FreeRaw]),
            ),
            MemoryFamily::Object => (
                sum(&[OperationKind::AllocObject]),
                sum(&[OperationKind::ReleaseObject]),
            ),
            MemoryFamily::ObjectArray => (
                sum(&[OperationKind::AllocObjectArray]),
                sum(&[OperationKind::ReleaseObjectArray]),
            ),
        };
        (plus.0 - minus.0, plus.1 - minus.1)
    }
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The three pairing families of the balance summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFamily {
    CMemory,
    Object,
    ObjectArray,
}

impl MemoryFamily {
    pub const ALL: [Self; 3] = [Self::CMemory, Self::Object, Self::ObjectArray];

    pub fn label(self) -> &'static str {
        match self {
            Self::CMemory => "malloc/free",
            Self::Object => "new/delete",
            Self::ObjectArray => "new[]/delete[]",
        }
    }
}
