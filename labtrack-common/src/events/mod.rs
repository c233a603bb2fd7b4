//! Event types for the LabTrack event system
//!
//! Provides shared event definitions and the EventBus every client region
//! observes. The auth-changed signal is the only coordination mechanism
//! between otherwise unrelated regions (navigation, route guards, workflow
//! entry).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Step of an upload/analysis session, as carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Upload,
    Processing,
    Results,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Upload => write!(f, "upload"),
            StepKind::Processing => write!(f, "processing"),
            StepKind::Results => write!(f, "results"),
        }
    }
}

/// LabTrack event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LabEvent {
    /// Persisted auth artifacts may have changed
    ///
    /// Carries no auth data. Every observer re-reads the persisted token and
    /// re-derives its own state.
    AuthStateChanged {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload session moved between steps
    UploadStepChanged {
        session_id: Uuid,
        /// Processing generation active when the transition happened
        generation: u64,
        old_step: StepKind,
        new_step: StepKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Simulated processing progress (0-100)
    UploadProgress {
        session_id: Uuid,
        generation: u64,
        progress: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis result committed to the session
    AnalysisCompleted {
        session_id: Uuid,
        /// Summary classification (`all-normal` / `partial-abnormal`)
        summary: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis call failed; session returned to Upload
    AnalysisFailed {
        session_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LabEvent {
    /// Shorthand for the auth broadcast
    pub fn auth_changed() -> Self {
        LabEvent::AuthStateChanged {
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LabEvent::AuthStateChanged { .. } => "AuthStateChanged",
            LabEvent::UploadStepChanged { .. } => "UploadStepChanged",
            LabEvent::UploadProgress { .. } => "UploadProgress",
            LabEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            LabEvent::AnalysisFailed { .. } => "AnalysisFailed",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use labtrack_common::events::{EventBus, LabEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(LabEvent::auth_changed()).ok();
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "AuthStateChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LabEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LabEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LabEvent) -> Result<usize, broadcast::error::SendError<LabEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// The auth broadcast is fire-and-forget: nobody mounted means nobody
    /// needs to recompute.
    pub fn emit_lossy(&self, event: LabEvent) {
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

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
