//! # Change Notifications
//!
//! The engine emits a "note changed" event whenever a cycle (or a manual
//! resolution) mutates a note's terminal state - Synced or Conflicted. The
//! channel is consumed by live-update delivery to connected clients; how
//! that delivery happens is out of scope here.
//!
//! Built on `tokio::sync::broadcast`: every subscriber gets every event,
//! and a slow subscriber only loses its own backlog, never the engine.

use tokio::sync::broadcast;
use tracing::debug;

use quill_core::SyncStatus;

/// Event published when a note reaches a terminal sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteChanged {
    /// Local note identifier.
    pub note_id: String,

    /// The note's version after the mutation.
    pub version: i64,

    /// The terminal state reached (Synced or Conflicted).
    pub sync_status: SyncStatus,
}

/// Broadcast channel for note change events.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<NoteChanged>,
}

impl ChangeNotifier {
    /// Creates a notifier with the given event buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeNotifier { tx }
    }

    /// Subscribes to note change events.
    pub fn subscribe(&self) -> broadcast::Receiver<NoteChanged> {
        self.tx.subscribe()
    }

    /// Publishes a change event. Having no subscribers is not an error.
    pub fn notify(&self, note_id: &str, version: i64, sync_status: SyncStatus) {
        let event = NoteChanged {
            note_id: note_id.to_string(),
            version,
            sync_status,
        };

        debug!(note_id = %event.note_id, version, status = %sync_status, "Note changed");
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        ChangeNotifier::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify("n1", 3, SyncStatus::Synced);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.note_id, "n1");
        assert_eq!(event.version, 3);
        assert_eq!(event.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_notify_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::default();
        notifier.notify("n1", 1, SyncStatus::Conflicted);
    }
}
