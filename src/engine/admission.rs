use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Outage-conflict check, applied to every candidate: no existing outage
/// record may overlap the candidate in both time and capability.
///
/// `exclude` skips the candidate's own prior record during modification.
pub(crate) fn check_outage_clear(
    rs: &SystemState,
    span: &Span,
    capabilities: CapabilityMask,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for record in rs.overlapping(span) {
        if record.kind.is_outage()
            && exclude != Some(record.id)
            && record.capabilities.conflicts(capabilities)
        {
            return Err(EngineError::OutageConflict {
                outage_id: record.id,
            });
        }
    }
    Ok(())
}

/// Capacity check for entry candidates: capability-agnostic count of
/// entries overlapping the candidate span. Capacity is a raw concurrency
/// bound, so disjoint masks still count.
pub(crate) fn check_capacity(
    rs: &SystemState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let overlapping = rs
        .overlapping(span)
        .filter(|r| r.kind == AllocationKind::Entry && exclude != Some(r.id))
        .count() as u32;
    if overlapping + 1 > rs.capacity {
        return Err(EngineError::CapacityExceeded {
            capacity: rs.capacity,
        });
    }
    Ok(())
}

/// Planned-outage precondition: the outage's full interval must already be
/// clear of entries that share a capability bit. Names every offender.
pub(crate) fn check_entries_clear(
    rs: &SystemState,
    span: &Span,
    capabilities: CapabilityMask,
) -> Result<(), EngineError> {
    let entries: Vec<Ulid> = rs
        .overlapping(span)
        .filter(|r| r.kind == AllocationKind::Entry && r.capabilities.conflicts(capabilities))
        .map(|r| r.id)
        .collect();
    if entries.is_empty() {
        Ok(())
    } else {
        Err(EngineError::EntryConflict { entries })
    }
}

/// Unplanned-outage precondition. Only the entry's *start* is examined:
/// with the outage's true duration unknown, an entry beginning anywhere
/// before the window boundary blocks admission — even one that has already
/// ended.
pub(crate) fn check_window_prefix_clear(
    rs: &SystemState,
    window_end: Ms,
    capabilities: CapabilityMask,
) -> Result<(), EngineError> {
    // Records are sorted by start, so the prefix scan stops at the boundary.
    let entries: Vec<Ulid> = rs
        .records
        .iter()
        .take_while(|r| r.span.start < window_end)
        .filter(|r| r.kind == AllocationKind::Entry && r.capabilities.conflicts(capabilities))
        .map(|r| r.id)
        .collect();
    if entries.is_empty() {
        Ok(())
    } else {
        Err(EngineError::EntryConflict { entries })
    }
}

/// Modification check: the new interval may not start inside any unresolved
/// unplanned outage's window (the same start-only test the reconciler
/// sweeps with). Moving an entry wholly past every active window is fine,
/// wherever it sat before.
pub(crate) fn check_outside_active_windows(
    rs: &SystemState,
    span: &Span,
    capabilities: CapabilityMask,
) -> Result<(), EngineError> {
    for outage in rs.active_unplanned() {
        if outage.capabilities.conflicts(capabilities) && span.start < outage.window_end() {
            return Err(EngineError::OutageConflict {
                outage_id: outage.id,
            });
        }
    }
    Ok(())
}
