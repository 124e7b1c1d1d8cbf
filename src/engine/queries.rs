use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub fn list_systems(&self) -> Vec<SystemInfo> {
        self.state
            .iter()
            .map(|entry| {
                let rs = entry.value().clone();
                let guard = rs.try_read().expect("list_systems: uncontended read");
                SystemInfo {
                    id: guard.id,
                    capacity: guard.capacity,
                    capabilities: guard.capabilities,
                }
            })
            .collect()
    }

    pub async fn get_system_info(&self, id: Ulid) -> Option<SystemInfo> {
        let rs = self.get_system(&id)?;
        let guard = rs.read().await;
        Some(SystemInfo {
            id: guard.id,
            capacity: guard.capacity,
            capabilities: guard.capabilities,
        })
    }

    pub async fn get_entries(&self, system_id: Ulid) -> Result<Vec<EntryInfo>, EngineError> {
        let rs = match self.get_system(&system_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .records
            .iter()
            .filter(|r| r.kind == AllocationKind::Entry)
            .map(|r| EntryInfo {
                id: r.id,
                system_id,
                start: r.span.start,
                end: r.span.end,
                capabilities: r.capabilities,
            })
            .collect())
    }

    /// Outage records currently in the conflict set: planned outages plus
    /// the window records of unresolved unplanned outages.
    pub async fn get_outages(&self, system_id: Ulid) -> Result<Vec<OutageInfo>, EngineError> {
        let rs = match self.get_system(&system_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .records
            .iter()
            .filter(|r| r.kind.is_outage())
            .map(|r| OutageInfo {
                id: r.id,
                system_id,
                start: r.span.start,
                end: r.span.end,
                capabilities: r.capabilities,
                kind: r.kind,
            })
            .collect())
    }

    pub async fn get_unplanned_outages(
        &self,
        system_id: Ulid,
    ) -> Result<Vec<UnplannedOutageInfo>, EngineError> {
        let rs = match self.get_system(&system_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .unplanned
            .iter()
            .map(|o| UnplannedOutageInfo {
                id: o.id,
                system_id,
                start: o.start,
                sliding_window: o.sliding_window,
                capabilities: o.capabilities,
                resolved_at: o.resolved_at,
            })
            .collect())
    }

    /// The raw ledger for a system, sorted by start.
    pub async fn get_allocations(
        &self,
        system_id: Ulid,
    ) -> Result<Vec<AllocationRecord>, EngineError> {
        let rs = match self.get_system(&system_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard.records.clone())
    }
}
