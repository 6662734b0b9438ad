//! Event types for the Dungeon Lab event system
//!
//! Provides shared event definitions and the EventBus used to push import
//! progress to SSE subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Dungeon Lab event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DlabEvent {
    /// Import job started processing
    ///
    /// Triggers:
    /// - SSE: Show import progress UI
    ImportJobStarted {
        /// Import job UUID
        job_id: Uuid,
        /// User who requested the import
        user_id: String,
        /// Compendium name from the manifest (empty until validated)
        compendium_name: String,
        /// When the job started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Import progress update
    ///
    /// Emitted by the job tracker whenever stage or counters change.
    ImportProgressUpdate {
        /// Import job UUID
        job_id: Uuid,
        /// Current stage (kebab-case)
        stage: String,
        /// Records processed so far
        processed_items: usize,
        /// Total records to process
        total_items: usize,
        /// Progress percentage (0.0-100.0)
        percentage: f32,
        /// Item currently being processed
        #[serde(default)]
        current_item: Option<String>,
        /// Errors recorded so far
        error_count: usize,
        /// Warnings recorded so far
        warning_count: usize,
        /// When progress updated
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Import job completed (possibly with per-record errors)
    ImportJobCompleted {
        /// Import job UUID
        job_id: Uuid,
        /// Created compendium (None for validate-only runs)
        compendium_id: Option<Uuid>,
        /// Documents persisted (or that would be persisted)
        documents: usize,
        /// Errors recorded
        error_count: usize,
        /// Warnings recorded
        warning_count: usize,
        /// Job duration in seconds
        duration_seconds: u64,
        /// When job completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Import job failed
    ImportJobFailed {
        /// Import job UUID
        job_id: Uuid,
        /// Error message details
        error_message: String,
        /// Records processed before failure
        processed_items: usize,
        /// When job failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DlabEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DlabEvent::ImportJobStarted { .. } => "ImportJobStarted",
            DlabEvent::ImportProgressUpdate { .. } => "ImportProgressUpdate",
            DlabEvent::ImportJobCompleted { .. } => "ImportJobCompleted",
            DlabEvent::ImportJobFailed { .. } => "ImportJobFailed",
        }
    }

    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            DlabEvent::ImportJobStarted { job_id, .. }
            | DlabEvent::ImportProgressUpdate { job_id, .. }
            | DlabEvent::ImportJobCompleted { job_id, .. }
            | DlabEvent::ImportJobFailed { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel. Slow subscribers lose the oldest
/// events rather than blocking emitters.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DlabEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// ```
    /// use dlab_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DlabEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: DlabEvent) -> Result<usize, broadcast::error::SendError<DlabEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DlabEvent) {
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
