use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-system broadcast hub. Every committed event fans out to that
/// system's subscribers — the reconciler's `EntryEvicted` events reach the
/// external notification/audit layer this way.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a system. Creates the channel if needed.
    pub fn subscribe(&self, system_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(system_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, system_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&system_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a system is retired).
    #[allow(dead_code)]
    pub fn remove(&self, system_id: &Ulid) {
        self.channels.remove(system_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}
