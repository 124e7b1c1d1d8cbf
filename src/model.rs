use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[allow(dead_code)]
    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Fixed-width bitset of capability flags. Two masks conflict when their
/// intersection is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMask(u32);

impl CapabilityMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn conflicts(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// What an allocation record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    /// Real occupancy. Counts toward the system's concurrency bound.
    Entry,
    /// Outage covering every capability the system supports.
    FullOutage,
    /// Outage covering a strict subset of the system's capabilities.
    CapabilityOutage,
}

impl AllocationKind {
    pub fn is_outage(self) -> bool {
        !matches!(self, AllocationKind::Entry)
    }
}

/// A single record in a system's ledger — entries and outage windows are
/// all just records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: Ulid,
    pub span: Span,
    pub kind: AllocationKind,
    pub capabilities: CapabilityMask,
}

/// Book-keeping for an unplanned outage. The conflict boundary
/// `[start, start + sliding_window)` is fixed at admission and never
/// re-derived from wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnplannedOutage {
    pub id: Ulid,
    pub start: Ms,
    pub sliding_window: Ms,
    pub capabilities: CapabilityMask,
    /// Set once the failure is over. A resolved outage stops blocking
    /// admission and is dropped from the reconciler's sweep set.
    pub resolved_at: Option<Ms>,
}

impl UnplannedOutage {
    pub fn window_end(&self) -> Ms {
        self.start + self.sliding_window
    }

    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SystemState {
    pub id: Ulid,
    /// Max concurrent entries at any instant.
    pub capacity: u32,
    /// Capabilities this system supports.
    pub capabilities: CapabilityMask,
    /// All admitted records (entries + outage windows), sorted by `span.start`.
    pub records: Vec<AllocationRecord>,
    /// Unplanned outages, active and resolved.
    pub unplanned: Vec<UnplannedOutage>,
}

impl SystemState {
    pub fn new(id: Ulid, capacity: u32, capabilities: CapabilityMask) -> Self {
        Self {
            id,
            capacity,
            capabilities,
            records: Vec::new(),
            unplanned: Vec::new(),
        }
    }

    /// Insert a record maintaining sort order by span.start.
    pub fn insert_record(&mut self, record: AllocationRecord) {
        let pos = self
            .records
            .binary_search_by_key(&record.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.records.insert(pos, record);
    }

    /// Remove a record by id.
    pub fn remove_record(&mut self, id: Ulid) -> Option<AllocationRecord> {
        if let Some(pos) = self.records.iter().position(|r| r.id == id) {
            Some(self.records.remove(pos))
        } else {
            None
        }
    }

    /// Return only records whose span overlaps the query window.
    /// Uses binary search to skip records starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &AllocationRecord> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.records.partition_point(|r| r.span.start < query.end);
        self.records[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Kind of an outage record on this system: a mask that covers the whole
    /// supported set is a full outage, anything narrower a capability outage.
    pub fn outage_kind(&self, capabilities: CapabilityMask) -> AllocationKind {
        if capabilities.contains(self.capabilities) {
            AllocationKind::FullOutage
        } else {
            AllocationKind::CapabilityOutage
        }
    }

    pub fn find_unplanned(&self, id: Ulid) -> Option<&UnplannedOutage> {
        self.unplanned.iter().find(|o| o.id == id)
    }

    /// Unresolved unplanned outages — the reconciler's sweep set.
    pub fn active_unplanned(&self) -> impl Iterator<Item = &UnplannedOutage> {
        self.unplanned.iter().filter(|o| o.is_active())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SystemRegistered {
        id: Ulid,
        capacity: u32,
        capabilities: CapabilityMask,
    },
    EntryAdmitted {
        id: Ulid,
        system_id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    },
    EntryModified {
        id: Ulid,
        system_id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    },
    PlannedOutageAdmitted {
        id: Ulid,
        system_id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    },
    UnplannedOutageAdmitted {
        id: Ulid,
        system_id: Ulid,
        start: Ms,
        sliding_window: Ms,
        capabilities: CapabilityMask,
    },
    OutageResolved {
        id: Ulid,
        system_id: Ulid,
        resolved_at: Ms,
    },
    AllocationRemoved {
        id: Ulid,
        system_id: Ulid,
    },
    /// Forced removal by the reconciler. Carries the outage that triggered
    /// it — this doubles as the outbound eviction notification payload.
    EntryEvicted {
        id: Ulid,
        system_id: Ulid,
        outage_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub id: Ulid,
    pub capacity: u32,
    pub capabilities: CapabilityMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub id: Ulid,
    pub system_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub capabilities: CapabilityMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutageInfo {
    pub id: Ulid,
    pub system_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub capabilities: CapabilityMask,
    pub kind: AllocationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnplannedOutageInfo {
    pub id: Ulid,
    pub system_id: Ulid,
    pub start: Ms,
    pub sliding_window: Ms,
    pub capabilities: CapabilityMask,
    pub resolved_at: Option<Ms>,
}
