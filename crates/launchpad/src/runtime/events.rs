//! Outward event channel for sequence progress and process bookkeeping

use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::runtime::entry::EntryStatus;

/// Capacity of the broadcast channel; countdown ticks arrive about ten per second
const EVENT_CAPACITY: usize = 256;

/// Display duration for long-lived status messages
pub const STATUS_DURATION_MS: u64 = 5000;

/// Severity of a status message, mapped to a color by presenters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Launching,
    Success,
    Warning,
    Error,
}

/// Human-readable status line for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
    pub display_duration_ms: u64,
}

/// Sequence lifecycle transitions visible outside the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStateChange {
    Started,
    Finished {
        launched_count: usize,
        total_count: usize,
    },
}

/// Everything the launcher core publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    SequenceStateChanged(SequenceStateChange),
    StatusMessage(StatusMessage),
    /// The set of tracked processes changed
    ProcessListChanged,
    EntryStatusChanged {
        name: String,
        path: PathBuf,
        status: EntryStatus,
    },
}

/// Fan-out bus shared by the sequencer and the registry.
///
/// Publishing never fails: with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LaunchEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LaunchEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: LaunchEvent) {
        log::trace!("Publishing {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn status(&self, text: impl Into<String>, severity: Severity, display_duration_ms: u64) {
        self.publish(LaunchEvent::StatusMessage(StatusMessage {
            text: text.into(),
            severity,
            display_duration_ms,
        }));
    }
}
