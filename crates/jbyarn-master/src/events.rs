//! Events delivered to the reconciliation loop.
//!
//! Resource manager and node agent callbacks arrive on their own tasks.
//! Each one becomes a [`ClusterEvent`] on a single channel, so the
//! demand counters are only ever touched by the loop that drains it.

use tokio::sync::mpsc;

use jbyarn_core::{SlotAllocation, SlotCompletion, SlotId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    // ── Resource manager ─────────────────────────────────────────
    /// New slots were granted.
    Allocated(Vec<SlotAllocation>),
    /// Slots reached a terminal state.
    Completed(Vec<SlotCompletion>),
    /// The resource manager asked the master to shut down.
    ShutdownRequested,
    /// Unrecoverable resource manager failure.
    Error(String),

    // ── Node agent ───────────────────────────────────────────────
    Started(SlotId),
    StartFailed { id: SlotId, cause: String },
    StatusReceived { id: SlotId, state: String },
    StatusFailed { id: SlotId, cause: String },
    Stopped(SlotId),
    StopFailed { id: SlotId, cause: String },

    // ── Launch workers ───────────────────────────────────────────
    /// A launch was abandoned before any start request was dispatched.
    LaunchAborted { id: SlotId, reason: String },
}

impl ClusterEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterEvent::Allocated(_) => "allocated",
            ClusterEvent::Completed(_) => "completed",
            ClusterEvent::ShutdownRequested => "shutdown_requested",
            ClusterEvent::Error(_) => "error",
            ClusterEvent::Started(_) => "started",
            ClusterEvent::StartFailed { .. } => "start_failed",
            ClusterEvent::StatusReceived { .. } => "status_received",
            ClusterEvent::StatusFailed { .. } => "status_failed",
            ClusterEvent::Stopped(_) => "stopped",
            ClusterEvent::StopFailed { .. } => "stop_failed",
            ClusterEvent::LaunchAborted { .. } => "launch_aborted",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ClusterEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ClusterEvent>;

/// The loop's inbox. Collaborators are built with [`EventChannel::sender`]
/// before the channel is handed to the controller.
#[derive(Debug)]
pub struct EventChannel {
    tx: EventSender,
    rx: EventReceiver,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    pub(crate) fn into_parts(self) -> (EventSender, EventReceiver) {
        (self.tx, self.rx)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
