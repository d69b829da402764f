//! # Event Bus System
//!
//! Typed events broadcast over `tokio::sync::broadcast` so observers (the CLI,
//! a web trigger, tests) can follow sweeps without coupling to the pipeline.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, MonitorEvent};
//!
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Monitor(MonitorEvent::Stopped))
//!     .ok();
//!
//! assert_eq!(
//!     subscriber.try_recv().unwrap(),
//!     CoreEvent::Monitor(MonitorEvent::Stopped)
//! );
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing with no subscribers returns `Err`; emitters ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation / compensation sweep events
    Sweep(SweepEvent),
    /// Background monitor lifecycle events
    Monitor(MonitorEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sweep(e) => e.description(),
            CoreEvent::Monitor(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sweep(SweepEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Monitor(MonitorEvent::CycleFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sweep(SweepEvent::Skipped { .. }) => EventSeverity::Warning,
            CoreEvent::Sweep(SweepEvent::Completed { .. })
            | CoreEvent::Sweep(SweepEvent::RecordUploaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Sweep Events
// ============================================================================

/// Events emitted while a sweep runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SweepEvent {
    /// Sweep acquired the lock and started.
    Started {
        sweep_id: String,
        /// `reconcile`, `compensate` or `barcode`
        kind: String,
    },
    /// Photos for one record reached the remote store.
    RecordUploaded {
        sweep_id: String,
        record_id: String,
        barcode: String,
        files: u32,
    },
    /// Sweep finished; per-record failures are counted, not fatal.
    Completed {
        sweep_id: String,
        kind: String,
        records_uploaded: u32,
        files_uploaded: u32,
        records_failed: u32,
        duration_ms: u64,
    },
    /// Another sweep held the lock.
    Skipped { kind: String },
    /// Sweep aborted (e.g. the remote query failed).
    Failed {
        sweep_id: String,
        kind: String,
        message: String,
    },
}

impl SweepEvent {
    fn description(&self) -> &str {
        match self {
            SweepEvent::Started { .. } => "Sweep started",
            SweepEvent::RecordUploaded { .. } => "Record photos uploaded",
            SweepEvent::Completed { .. } => "Sweep completed",
            SweepEvent::Skipped { .. } => "Sweep skipped, another sweep is running",
            SweepEvent::Failed { .. } => "Sweep failed",
        }
    }
}

// ============================================================================
// Monitor Events
// ============================================================================

/// Background monitor lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MonitorEvent {
    Started { interval_secs: u64 },
    Stopped,
    /// A cycle panicked or failed; the loop keeps running.
    CycleFailed { message: String },
}

impl MonitorEvent {
    fn description(&self) -> &str {
        match self {
            MonitorEvent::Started { .. } => "Monitor started",
            MonitorEvent::Stopped => "Monitor stopped",
            MonitorEvent::CycleFailed { .. } => "Monitor cycle failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for publishing events.
///
/// Cloning is cheap; clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(16);
/// let sweeps_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sweep(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match the predicate will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> CoreEvent {
        CoreEvent::Sweep(SweepEvent::Started {
            sweep_id: id.to_string(),
            kind: "reconcile".to_string(),
        })
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(started("s1")).unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), started("s1"));
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::default();
        assert!(bus.emit(started("s1")).is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_filter_skips_other_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|e| matches!(e, CoreEvent::Monitor(_)));

        bus.emit(started("s1")).unwrap();
        bus.emit(CoreEvent::Monitor(MonitorEvent::Stopped)).unwrap();

        assert_eq!(
            stream.recv().await.unwrap(),
            CoreEvent::Monitor(MonitorEvent::Stopped)
        );
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for i in 0..5 {
            bus.emit(started(&format!("s{}", i))).unwrap();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(3)))));
        assert_eq!(stream.try_recv(), Some(Ok(started("s3"))));
    }

    #[test]
    fn test_severity() {
        let failed = CoreEvent::Sweep(SweepEvent::Failed {
            sweep_id: "s1".to_string(),
            kind: "reconcile".to_string(),
            message: "query failed".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(
            CoreEvent::Sweep(SweepEvent::Skipped {
                kind: "compensate".to_string()
            })
            .severity(),
            EventSeverity::Warning
        );
        assert_eq!(started("s1").severity(), EventSeverity::Debug);
        assert_eq!(failed.description(), "Sweep failed");
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(CoreEvent::Monitor(MonitorEvent::Started {
            interval_secs: 600,
        }))
        .unwrap();

        assert_eq!(json["type"], "Monitor");
        assert_eq!(json["payload"]["event"], "Started");
        assert_eq!(json["payload"]["interval_secs"], 600);
    }
}
