//! Interfaces of the cluster services the master drives.
//!
//! Calls are asynchronous requests. Outcomes that the cluster reports
//! later (allocations, completions, start results) arrive as
//! [`ClusterEvent`](crate::events::ClusterEvent)s on the sender each
//! implementation is built with.

use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use jbyarn_core::{AllocationRequest, ArtifactUri, FinalStatus, LaunchSpec, Registration, SlotAllocation, SlotId};

use crate::error::{CollaboratorError, CollaboratorResult};

/// The cluster's resource manager.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Register this master. Answers the cluster's maximum capability.
    async fn register(
        &self,
        host: &str,
        rpc_port: u16,
        tracking_url: &str,
    ) -> CollaboratorResult<Registration>;

    /// Queue one slot request. The grant arrives as `Allocated`.
    async fn add_allocation_request(&self, request: AllocationRequest) -> CollaboratorResult<()>;

    /// Hand a granted slot back without using it.
    async fn release(&self, id: &SlotId) -> CollaboratorResult<()>;

    async fn unregister(&self, status: FinalStatus, message: Option<&str>) -> CollaboratorResult<()>;

    async fn stop(&self);
}

/// The per-host agents that run slot processes.
///
/// Every call returns once the request is dispatched; results arrive as
/// `Started`/`StartFailed`, `StatusReceived`/`StatusFailed`, and
/// `Stopped`/`StopFailed` events.
#[async_trait]
pub trait NodeAgent: Send + Sync {
    async fn start(&self, slot: &SlotAllocation, spec: LaunchSpec);

    async fn status(&self, slot: &SlotAllocation);

    async fn stop_slot(&self, slot: &SlotAllocation);

    /// Stop every slot this agent started and refuse new ones.
    async fn shutdown(&self);
}

/// Size and modification time of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub size: u64,
    pub modified_ms: u64,
}

/// Where launch artifacts are looked up before they are localized.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn stat(&self, uri: &ArtifactUri) -> CollaboratorResult<ArtifactStatus>;
}

/// Artifact store backed by the local filesystem.
///
/// Only `file://` locations (and bare absolute paths) resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalArtifactStore;

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn stat(&self, uri: &ArtifactUri) -> CollaboratorResult<ArtifactStatus> {
        let path = uri
            .local_path()
            .ok_or_else(|| CollaboratorError::UnsupportedArtifact(uri.to_string()))?;
        let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CollaboratorError::ArtifactNotFound(uri.to_string()),
            _ => CollaboratorError::from(e),
        })?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(ArtifactStatus {
            size: meta.len(),
            modified_ms,
        })
    }
}
