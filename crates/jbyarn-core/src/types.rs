//! Slot, completion, and launch types shared by the master and its
//! collaborators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ABORTED_EXIT_STATUS, COMMAND_SEPARATOR};

// ── Slots ─────────────────────────────────────────────────────────

/// Opaque identity of an allocated slot (container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SlotId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Memory and cores granted to (or asked for) a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub memory_mb: u64,
    pub vcores: u32,
}

/// A slot handed out by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocation {
    pub id: SlotId,
    /// Host the slot runs on.
    pub host: String,
    /// Port of the node agent on that host.
    pub node_port: u16,
    pub resource: Resource,
}

/// One allocation ask sent to the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub resource: Resource,
    pub priority: i32,
}

/// What the resource manager answers on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub max_capability: Resource,
}

// ── Completions ───────────────────────────────────────────────────

/// Terminal report for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCompletion {
    pub id: SlotId,
    pub exit_code: i32,
    /// Terminated by the infrastructure rather than by the workload.
    pub abnormal: bool,
    pub diagnostics: String,
}

/// How a completion counts against the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Succeeded,
    Failed,
    Aborted,
}

impl SlotCompletion {
    pub fn exited(id: impl Into<SlotId>, exit_code: i32) -> Self {
        Self {
            id: id.into(),
            exit_code,
            abnormal: false,
            diagnostics: String::new(),
        }
    }

    pub fn aborted(id: impl Into<SlotId>) -> Self {
        Self {
            id: id.into(),
            exit_code: ABORTED_EXIT_STATUS,
            abnormal: true,
            diagnostics: "container aborted by the infrastructure".to_string(),
        }
    }

    pub fn outcome(&self) -> CompletionOutcome {
        if self.exit_code == 0 {
            CompletionOutcome::Succeeded
        } else if self.abnormal {
            CompletionOutcome::Aborted
        } else {
            CompletionOutcome::Failed
        }
    }
}

/// Final status reported when the master unregisters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Succeeded,
    Failed,
}

impl FinalStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            FinalStatus::Succeeded => 0,
            FinalStatus::Failed => 2,
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Succeeded => f.write_str("SUCCEEDED"),
            FinalStatus::Failed => f.write_str("FAILED"),
        }
    }
}

// ── Launch specification ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    /// Unpacked by the node agent before launch.
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Application,
}

/// An artifact the node agent localizes into the slot before launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    pub kind: ResourceKind,
    pub visibility: Visibility,
    /// Artifact location as a URI string.
    pub location: String,
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch.
    pub modified_ms: u64,
}

/// Everything the node agent needs to start a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub env: BTreeMap<String, String>,
    /// Link name → resource.
    pub resources: BTreeMap<String, LocalResource>,
    /// Ordered command fragments; joined with spaces into one shell line.
    pub commands: Vec<String>,
}

impl LaunchSpec {
    /// Append a command, separated from the previous one by
    /// [`COMMAND_SEPARATOR`].
    pub fn push_command(&mut self, command: impl Into<String>) {
        if !self.commands.is_empty() {
            self.commands.push(COMMAND_SEPARATOR.to_string());
        }
        self.commands.push(command.into());
    }

    /// The shell line the node agent executes.
    pub fn command_line(&self) -> String {
        self.commands.join(" ")
    }
}
