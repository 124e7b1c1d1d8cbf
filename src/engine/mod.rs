mod admission;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSystemState = Arc<RwLock<SystemState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The allocation ledger: one `SystemState` per registered system, all
/// mutations serialized per system through its RwLock write guard.
pub struct Engine {
    pub state: DashMap<Ulid, SharedSystemState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: allocation id → system id
    pub(super) allocation_to_system: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a SystemState (no locking — caller holds the lock).
fn apply_to_system(rs: &mut SystemState, event: &Event, allocations: &DashMap<Ulid, Ulid>) {
    match event {
        Event::EntryAdmitted {
            id,
            system_id,
            span,
            capabilities,
        } => {
            rs.insert_record(AllocationRecord {
                id: *id,
                span: *span,
                kind: AllocationKind::Entry,
                capabilities: *capabilities,
            });
            allocations.insert(*id, *system_id);
        }
        Event::EntryModified {
            id,
            system_id,
            span,
            capabilities,
        } => {
            rs.remove_record(*id);
            rs.insert_record(AllocationRecord {
                id: *id,
                span: *span,
                kind: AllocationKind::Entry,
                capabilities: *capabilities,
            });
            allocations.insert(*id, *system_id);
        }
        Event::PlannedOutageAdmitted {
            id,
            system_id,
            span,
            capabilities,
        } => {
            let kind = rs.outage_kind(*capabilities);
            rs.insert_record(AllocationRecord {
                id: *id,
                span: *span,
                kind,
                capabilities: *capabilities,
            });
            allocations.insert(*id, *system_id);
        }
        Event::UnplannedOutageAdmitted {
            id,
            system_id,
            start,
            sliding_window,
            capabilities,
        } => {
            let span = Span::new(*start, *start + *sliding_window);
            let kind = rs.outage_kind(*capabilities);
            rs.insert_record(AllocationRecord {
                id: *id,
                span,
                kind,
                capabilities: *capabilities,
            });
            rs.unplanned.push(UnplannedOutage {
                id: *id,
                start: *start,
                sliding_window: *sliding_window,
                capabilities: *capabilities,
                resolved_at: None,
            });
            allocations.insert(*id, *system_id);
        }
        Event::OutageResolved { id, resolved_at, .. } => {
            if let Some(outage) = rs.unplanned.iter_mut().find(|o| o.id == *id) {
                outage.resolved_at = Some(*resolved_at);
            }
            // The window record stops blocking admission; the outage stays
            // addressable (resolved) for audit and removal.
            rs.remove_record(*id);
        }
        Event::AllocationRemoved { id, .. } => {
            rs.remove_record(*id);
            rs.unplanned.retain(|o| o.id != *id);
            allocations.remove(id);
        }
        Event::EntryEvicted { id, .. } => {
            rs.remove_record(*id);
            allocations.remove(id);
        }
        // SystemRegistered is handled at the DashMap level, not here
        Event::SystemRegistered { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            allocation_to_system: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::SystemRegistered {
                    id,
                    capacity,
                    capabilities,
                } => {
                    let rs = SystemState::new(*id, *capacity, *capabilities);
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                other => {
                    if let Some(system_id) = event_system_id(other)
                        && let Some(entry) = engine.state.get(&system_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_system(&mut guard, other, &engine.allocation_to_system);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::SYSTEMS_ACTIVE).set(engine.state.len() as f64);
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_system(&self, id: &Ulid) -> Option<SharedSystemState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_system_for_allocation(&self, allocation_id: &Ulid) -> Option<Ulid> {
        self.allocation_to_system.get(allocation_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        system_id: Ulid,
        rs: &mut SystemState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_system(rs, event, &self.allocation_to_system);
        self.notify.send(system_id, event);
        Ok(())
    }

    /// Lookup allocation → system, get system, acquire write lock.
    pub(super) async fn resolve_allocation_write(
        &self,
        allocation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<SystemState>), EngineError> {
        let system_id = self
            .get_system_for_allocation(allocation_id)
            .ok_or(EngineError::AllocationNotFound(*allocation_id))?;
        let rs = self
            .get_system(&system_id)
            .ok_or(EngineError::SystemNotFound(system_id))?;
        let guard = rs.write_owned().await;
        Ok((system_id, guard))
    }
}

/// Extract the system_id from an event (for non-registration events).
fn event_system_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::EntryAdmitted { system_id, .. }
        | Event::EntryModified { system_id, .. }
        | Event::PlannedOutageAdmitted { system_id, .. }
        | Event::UnplannedOutageAdmitted { system_id, .. }
        | Event::OutageResolved { system_id, .. }
        | Event::AllocationRemoved { system_id, .. }
        | Event::EntryEvicted { system_id, .. } => Some(*system_id),
        Event::SystemRegistered { .. } => None,
    }
}
