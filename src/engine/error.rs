use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug)]
pub enum EngineError {
    SystemNotFound(Ulid),
    AllocationNotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidInterval { start: Ms, end: Ms },
    /// Candidate overlaps an existing outage record in time and capability.
    OutageConflict { outage_id: Ulid },
    /// Outage candidate must be cleared of these entries first.
    EntryConflict { entries: Vec<Ulid> },
    CapacityExceeded { capacity: u32 },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SystemNotFound(id) => write!(f, "system not found: {id}"),
            EngineError::AllocationNotFound(id) => write!(f, "allocation not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval: [{start}, {end})")
            }
            EngineError::OutageConflict { outage_id } => {
                write!(f, "conflict with outage: {outage_id}")
            }
            EngineError::EntryConflict { entries } => {
                write!(f, "conflicting entries must be cleared first: {entries:?}")
            }
            EngineError::CapacityExceeded { capacity } => {
                write!(f, "capacity {capacity} exceeded: all slots occupied")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
