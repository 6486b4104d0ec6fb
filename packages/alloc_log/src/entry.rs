/// The kind of allocation traffic a [`LogEntry`] describes.
///
/// `Malloc` and `Free` are reported by the terminal allocator that talks to the system heap,
/// `Allocate` and `Deallocate` by the strategies layered on top of it. The two fused kinds
/// only ever appear as the product of compaction in the [`EventLog`][crate::EventLog].
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    /// Memory was obtained from the system heap.
    #[display("malloc")]
    Malloc,

    /// Memory was returned to the system heap.
    #[display("free")]
    Free,

    /// An allocation strategy handed out memory to its caller.
    #[display("allocate")]
    Allocate,

    /// An allocation strategy took memory back from its caller.
    #[display("deallocate")]
    Deallocate,

    /// A `Malloc` immediately followed by an `Allocate` of the same address.
    #[display("malloc+allocate")]
    MallocAllocate,

    /// A `Deallocate` immediately followed by a `Free` of the same address.
    #[display("free+deallocate")]
    FreeDeallocate,
}

/// One step of allocation traffic, possibly standing for a run of identical steps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct LogEntry {
    /// What happened.
    pub kind: EventKind,

    /// Address involved. For a collapsed run this is the address of the most recent event.
    pub address: usize,

    /// Size in bytes of each event in the run.
    pub size: usize,

    /// How many consecutive events this entry stands for. Never zero.
    pub repeat: usize,
}

impl LogEntry {
    /// Creates an entry for a single event.
    #[must_use]
    pub const fn single(kind: EventKind, address: usize, size: usize) -> Self {
        Self {
            kind,
            address,
            size,
            repeat: 1,
        }
    }

    /// Total number of bytes covered by the run.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.repeat.saturating_mul(self.size)
    }

    /// Attempts to fuse `next`, the entry written immediately after `self`, into `self`.
    ///
    /// A `Malloc` followed by an `Allocate` at the same address becomes `MallocAllocate`, and a
    /// `Deallocate` followed by a `Free` at the same address becomes `FreeDeallocate`. A run that
    /// has already collapsed (repeat above one) never changes kind.
    ///
    /// Returns `true` if `next` has been absorbed and should be discarded.
    pub(crate) fn try_fuse(&mut self, next: &Self) -> bool {
        if self.repeat != 1 || self.address != next.address {
            return false;
        }

        let fused = match (self.kind, next.kind) {
            (EventKind::Malloc, EventKind::Allocate) => EventKind::MallocAllocate,
            (EventKind::Deallocate, EventKind::Free) => EventKind::FreeDeallocate,
            _ => return false,
        };

        self.kind = fused;
        true
    }

    /// Attempts to fold `self` into `next` as part of a run of identical events.
    ///
    /// Entries merge when they share kind and size. The repeat count of `self` is added onto
    /// `next`, after which `self` should be discarded.
    pub(crate) fn try_merge_into(&self, next: &mut Self) -> bool {
        if self.kind != next.kind || self.size != next.size {
            return false;
        }

        next.repeat = next.repeat.saturating_add(self.repeat);
        true
    }
}
