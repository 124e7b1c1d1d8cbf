use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::admission::{
    check_capacity, check_entries_clear, check_outage_clear, check_outside_active_windows,
    check_window_prefix_clear, validate_span,
};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn register_system(
        &self,
        id: Ulid,
        capacity: u32,
        capabilities: CapabilityMask,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_SYSTEMS {
            return Err(EngineError::LimitExceeded("too many systems"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SystemRegistered {
            id,
            capacity,
            capabilities,
        };
        self.wal_append(&event).await?;
        let rs = SystemState::new(id, capacity, capabilities);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(crate::observability::SYSTEMS_ACTIVE).increment(1.0);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Admit an entry occupying `span` on the system. Rejected when it
    /// overlaps an outage that shares a capability bit, or when the number
    /// of entries overlapping `span` is already at capacity.
    pub async fn admit_entry(
        &self,
        id: Ulid,
        system_id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        let rs = self
            .get_system(&system_id)
            .ok_or(EngineError::SystemNotFound(system_id))?;
        let mut guard = rs.write().await;
        if guard.records.len() >= MAX_RECORDS_PER_SYSTEM {
            return Err(EngineError::LimitExceeded("too many records on system"));
        }
        if self.allocation_to_system.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        check_outage_clear(&guard, &span, capabilities, None)?;
        check_capacity(&guard, &span, None)?;

        let event = Event::EntryAdmitted {
            id,
            system_id,
            span,
            capabilities,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await
    }

    /// Admit a maintenance window with a known end. Every entry overlapping
    /// `span` with a shared capability bit must have been removed first;
    /// the rejection lists all of them.
    pub async fn admit_planned_outage(
        &self,
        id: Ulid,
        system_id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        let rs = self
            .get_system(&system_id)
            .ok_or(EngineError::SystemNotFound(system_id))?;
        let mut guard = rs.write().await;
        if guard.records.len() >= MAX_RECORDS_PER_SYSTEM {
            return Err(EngineError::LimitExceeded("too many records on system"));
        }
        if self.allocation_to_system.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        check_entries_clear(&guard, &span, capabilities)?;
        check_outage_clear(&guard, &span, capabilities, None)?;

        let event = Event::PlannedOutageAdmitted {
            id,
            system_id,
            span,
            capabilities,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await
    }

    /// Admit a failure with an unknown end. The conflict boundary
    /// `[start, start + sliding_window)` is fixed here, at admission, and
    /// enters the ledger as an outage record until the outage is resolved.
    pub async fn admit_unplanned_outage(
        &self,
        id: Ulid,
        system_id: Ulid,
        start: Ms,
        sliding_window: Ms,
        capabilities: CapabilityMask,
    ) -> Result<(), EngineError> {
        if sliding_window <= 0 {
            return Err(EngineError::InvalidInterval {
                start,
                end: start + sliding_window,
            });
        }
        if sliding_window > MAX_SLIDING_WINDOW_MS {
            return Err(EngineError::LimitExceeded("sliding window too wide"));
        }
        let window = Span::new(start, start + sliding_window);
        validate_span(&window)?;

        let rs = self
            .get_system(&system_id)
            .ok_or(EngineError::SystemNotFound(system_id))?;
        let mut guard = rs.write().await;
        if guard.records.len() >= MAX_RECORDS_PER_SYSTEM {
            return Err(EngineError::LimitExceeded("too many records on system"));
        }
        if self.allocation_to_system.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        check_window_prefix_clear(&guard, window.end, capabilities)?;
        check_outage_clear(&guard, &window, capabilities, None)?;

        let event = Event::UnplannedOutageAdmitted {
            id,
            system_id,
            start,
            sliding_window,
            capabilities,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await
    }

    /// Close an unplanned outage. Its window record leaves the conflict set,
    /// so admission is no longer blocked, and the reconciler drops it from
    /// the sweep set on the next cycle. Resolving twice is a no-op.
    pub async fn resolve_outage(&self, id: Ulid, resolved_at: Ms) -> Result<(), EngineError> {
        let (system_id, mut guard) = self.resolve_allocation_write(&id).await?;
        let active = match guard.find_unplanned(id) {
            Some(outage) => outage.is_active(),
            // Entries and planned outages don't resolve
            None => return Err(EngineError::AllocationNotFound(id)),
        };
        if !active {
            return Ok(());
        }

        let event = Event::OutageResolved {
            id,
            system_id,
            resolved_at,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await
    }

    /// Unconditional removal: entry cancellation, planned-outage
    /// cancellation, or unplanned-outage withdrawal. Removal can't violate
    /// any invariant, so there is no cross-check.
    pub async fn remove_allocation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (system_id, mut guard) = self.resolve_allocation_write(&id).await?;
        let event = Event::AllocationRemoved { id, system_id };
        self.persist_and_apply(system_id, &mut guard, &event).await?;
        Ok(system_id)
    }

    /// Remove-then-readmit, atomically under the system lock. The entry's
    /// own prior record is excluded from every conflict and capacity count.
    /// The new interval must additionally start outside every unresolved
    /// unplanned outage's window.
    pub async fn modify_entry(
        &self,
        id: Ulid,
        span: Span,
        capabilities: CapabilityMask,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        let (system_id, mut guard) = self.resolve_allocation_write(&id).await?;
        let is_entry = guard
            .records
            .iter()
            .any(|r| r.id == id && r.kind == AllocationKind::Entry);
        if !is_entry {
            return Err(EngineError::AllocationNotFound(id));
        }

        check_outage_clear(&guard, &span, capabilities, Some(id))?;
        check_capacity(&guard, &span, Some(id))?;
        check_outside_active_windows(&guard, &span, capabilities)?;

        let event = Event::EntryModified {
            id,
            system_id,
            span,
            capabilities,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await
    }

    /// Snapshot pass for the reconciler: every entry whose start lies inside
    /// an unresolved unplanned outage's window with a shared capability bit.
    /// Returns `(entry_id, system_id, outage_id)` triples.
    pub fn collect_sweep_evictions(&self) -> Vec<(Ulid, Ulid, Ulid)> {
        let mut targets = Vec::new();
        for item in self.state.iter() {
            let rs = item.value().clone();
            if let Ok(guard) = rs.try_read() {
                for outage in guard.active_unplanned() {
                    let window_end = outage.window_end();
                    for record in &guard.records {
                        if record.span.start >= window_end {
                            break; // sorted by start
                        }
                        if record.kind == AllocationKind::Entry
                            && record.capabilities.conflicts(outage.capabilities)
                        {
                            targets.push((record.id, guard.id, outage.id));
                        }
                    }
                }
            }
        }
        targets
    }

    /// Forcibly remove an entry caught inside an outage window. Re-verifies
    /// the target under the system's write lock: the entry may have been
    /// cancelled, moved outside the window, or the outage resolved since the
    /// sweep collected it — all of those skip with `AllocationNotFound`.
    pub async fn evict_entry(&self, id: Ulid, outage_id: Ulid) -> Result<Ulid, EngineError> {
        let (system_id, mut guard) = self.resolve_allocation_write(&id).await?;

        let window = guard
            .find_unplanned(outage_id)
            .filter(|o| o.is_active())
            .map(|o| (o.window_end(), o.capabilities));
        let Some((window_end, outage_caps)) = window else {
            return Err(EngineError::AllocationNotFound(id));
        };
        let still_inside = guard.records.iter().any(|r| {
            r.id == id
                && r.kind == AllocationKind::Entry
                && r.span.start < window_end
                && r.capabilities.conflicts(outage_caps)
        });
        if !still_inside {
            return Err(EngineError::AllocationNotFound(id));
        }

        let event = Event::EntryEvicted {
            id,
            system_id,
            outage_id,
        };
        self.persist_and_apply(system_id, &mut guard, &event).await?;
        Ok(system_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for item in self.state.iter() {
            let rs = item.value().clone();
            let guard = rs.try_read().expect("compact: uncontended read");

            events.push(Event::SystemRegistered {
                id: guard.id,
                capacity: guard.capacity,
                capabilities: guard.capabilities,
            });

            // Unplanned outages replay through their admission event so the
            // window record and sweep metadata are rebuilt together; a
            // resolution event re-closes the resolved ones.
            let unplanned_ids: HashSet<Ulid> = guard.unplanned.iter().map(|o| o.id).collect();
            for outage in &guard.unplanned {
                events.push(Event::UnplannedOutageAdmitted {
                    id: outage.id,
                    system_id: guard.id,
                    start: outage.start,
                    sliding_window: outage.sliding_window,
                    capabilities: outage.capabilities,
                });
                if let Some(resolved_at) = outage.resolved_at {
                    events.push(Event::OutageResolved {
                        id: outage.id,
                        system_id: guard.id,
                        resolved_at,
                    });
                }
            }

            for record in &guard.records {
                if unplanned_ids.contains(&record.id) {
                    continue;
                }
                match record.kind {
                    AllocationKind::Entry => events.push(Event::EntryAdmitted {
                        id: record.id,
                        system_id: guard.id,
                        span: record.span,
                        capabilities: record.capabilities,
                    }),
                    AllocationKind::FullOutage | AllocationKind::CapabilityOutage => {
                        events.push(Event::PlannedOutageAdmitted {
                            id: record.id,
                            system_id: guard.id,
                            span: record.span,
                            capabilities: record.capabilities,
                        })
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
