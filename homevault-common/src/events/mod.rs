//! Event types for the HomeVault event system
//!
//! Provides shared event definitions and the EventBus used for SSE broadcasting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// HomeVault event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every batch event carries its batch id, so observers of concurrent
/// batches never confuse one batch's progress with another's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultEvent {
    /// Batch accepted and processing started
    ///
    /// Triggers:
    /// - SSE: Show the floating progress indicator
    BatchStarted {
        batch_id: Uuid,
        user_id: String,
        total_files: usize,
        timestamp: DateTime<Utc>,
    },

    /// One more file of a batch finished (successfully or not)
    ///
    /// Triggers:
    /// - SSE: Advance the floating progress indicator
    BatchProgress {
        batch_id: Uuid,
        user_id: String,
        files_completed: usize,
        total_files: usize,
        /// Progress percentage (0.0-100.0)
        percentage: f32,
        /// Name of the file that just finished
        #[serde(default)]
        current_file: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Batch ran through its whole file list
    BatchCompleted {
        batch_id: Uuid,
        user_id: String,
        successful: usize,
        failed: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Batch aborted by an error outside the per-file boundary
    BatchFailed {
        batch_id: Uuid,
        user_id: String,
        error_message: String,
        files_completed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Asset record created
    AssetCreated {
        user_id: String,
        asset_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Asset record modified (manual edit or image attached)
    AssetUpdated {
        user_id: String,
        asset_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Asset record deleted
    AssetDeleted {
        user_id: String,
        asset_id: Uuid,
        /// Whether the stored image was removed as well
        image_deleted: bool,
        timestamp: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            VaultEvent::BatchStarted { .. } => "BatchStarted",
            VaultEvent::BatchProgress { .. } => "BatchProgress",
            VaultEvent::BatchCompleted { .. } => "BatchCompleted",
            VaultEvent::BatchFailed { .. } => "BatchFailed",
            VaultEvent::AssetCreated { .. } => "AssetCreated",
            VaultEvent::AssetUpdated { .. } => "AssetUpdated",
            VaultEvent::AssetDeleted { .. } => "AssetDeleted",
        }
    }

    /// Owning user of the event
    pub fn user_id(&self) -> &str {
        match self {
            VaultEvent::BatchStarted { user_id, .. }
            | VaultEvent::BatchProgress { user_id, .. }
            | VaultEvent::BatchCompleted { user_id, .. }
            | VaultEvent::BatchFailed { user_id, .. }
            | VaultEvent::AssetCreated { user_id, .. }
            | VaultEvent::AssetUpdated { user_id, .. }
            | VaultEvent::AssetDeleted { user_id, .. } => user_id,
        }
    }

    /// Batch lifecycle events drive the progress indicator
    pub fn is_batch_event(&self) -> bool {
        matches!(
            self,
            VaultEvent::BatchStarted { .. }
                | VaultEvent::BatchProgress { .. }
                | VaultEvent::BatchCompleted { .. }
                | VaultEvent::BatchFailed { .. }
        )
    }
}

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Multiple subscribers, each receiving every event
/// - Bounded buffering; slow subscribers lag rather than block emitters
/// - Cheap cloning (all clones share one channel)
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VaultEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use homevault_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: VaultEvent,
    ) -> Result<usize, broadcast::error::SendError<VaultEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: VaultEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(batch_id: Uuid, done: usize) -> VaultEvent {
        VaultEvent::BatchProgress {
            batch_id,
            user_id: "user-1".to_string(),
            files_completed: done,
            total_files: 3,
            percentage: done as f32 / 3.0 * 100.0,
            current_file: Some(format!("photo-{}.jpg", done)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress(Uuid::new_v4(), 1)).is_err());
    }

    #[test]
    fn test_eventbus_emit_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        let batch_id = Uuid::new_v4();
        for i in 0..10 {
            bus.emit_lossy(progress(batch_id, i));
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_eventbus_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(progress(Uuid::new_v4(), 1)).expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().event_type(), "BatchProgress");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "BatchProgress");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let batch_id = Uuid::new_v4();
        let json = serde_json::to_value(progress(batch_id, 2)).unwrap();
        assert_eq!(json["type"], "BatchProgress");
        assert_eq!(json["files_completed"], 2);
        assert_eq!(json["batch_id"], batch_id.to_string());

        let back: VaultEvent = serde_json::from_value(json).unwrap();
        assert!(back.is_batch_event());
        assert_eq!(back.user_id(), "user-1");
    }

    #[test]
    fn test_asset_events_are_not_batch_events() {
        let event = VaultEvent::AssetDeleted {
            user_id: "u".to_string(),
            asset_id: Uuid::new_v4(),
            image_deleted: true,
            timestamp: Utc::now(),
        };
        assert!(!event.is_batch_event());
        assert_eq!(event.event_type(), "AssetDeleted");
    }
}
