use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::engine::{BlockedDateSet, Rejection};
use crate::model::*;
use crate::session::SessionObserver;

const CHANNEL_CAPACITY: usize = 64;

/// Broadcast hub fanning session events out to UI hosts, one channel per session.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<SessionEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a session. Creates the channel if needed.
    pub fn subscribe(&self, session_id: Ulid) -> broadcast::Receiver<SessionEvent> {
        let sender = self
            .channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, session_id: Ulid, event: SessionEvent) {
        if let Some(sender) = self.channels.get(&session_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop a session's channel once the session is closed.
    pub fn remove(&self, session_id: &Ulid) {
        self.channels.remove(session_id);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl SessionObserver for NotifyHub {
    fn on_blocked_set_ready(&self, session_id: Ulid, item: &ItemKey, blocked: &BlockedDateSet) {
        self.send(
            session_id,
            SessionEvent::BlockedSetReady {
                session_id,
                item: item.clone(),
                runs: blocked.runs(),
            },
        );
    }

    fn on_validation_result(&self, session_id: Ulid, result: Result<DateRange, Rejection>) {
        self.send(session_id, SessionEvent::ValidationResult { session_id, result });
    }

    fn on_session_closed(&self, session_id: Ulid) {
        self.remove(&session_id);
    }
}
