use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use jbyarn_core::{
    AllocationRequest, FinalStatus, LocalBackendConfig, Registration, Resource, SlotAllocation,
    SlotCompletion, SlotId,
};

use crate::collaborator::ResourceManager;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::events::{ClusterEvent, EventSender};

/// Grants slots on the local host as soon as they are asked for.
pub struct LocalResourceManager {
    config: LocalBackendConfig,
    app_id: String,
    events: EventSender,
    next_slot: AtomicU64,
    registered: AtomicBool,
}

impl LocalResourceManager {
    pub fn new(config: LocalBackendConfig, app_id: &str, events: EventSender) -> Self {
        Self {
            config,
            app_id: app_id.to_string(),
            events,
            next_slot: AtomicU64::new(1),
            registered: AtomicBool::new(false),
        }
    }

    fn send(&self, event: ClusterEvent) -> CollaboratorResult<()> {
        self.events
            .send(event)
            .map_err(|_| CollaboratorError::Unavailable("master event channel closed".to_string()))
    }
}

#[async_trait]
impl ResourceManager for LocalResourceManager {
    async fn register(
        &self,
        host: &str,
        rpc_port: u16,
        tracking_url: &str,
    ) -> CollaboratorResult<Registration> {
        self.registered.store(true, Ordering::SeqCst);
        info!(%host, rpc_port, %tracking_url, hostname = %self.config.hostname, "master registered with local resource manager");
        Ok(Registration {
            max_capability: Resource {
                memory_mb: self.config.max_memory_mb,
                vcores: self.config.max_vcores,
            },
        })
    }

    async fn add_allocation_request(&self, request: AllocationRequest) -> CollaboratorResult<()> {
        if !self.registered.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected(
                "allocation request before registration".to_string(),
            ));
        }
        let n = self.next_slot.fetch_add(1, Ordering::SeqCst);
        let slot = SlotAllocation {
            id: SlotId::new(format!("container_{}_{n:06}", self.app_id)),
            host: self.config.hostname.clone(),
            node_port: 0,
            resource: request.resource,
        };
        debug!(slot = %slot.id, priority = request.priority, "slot granted");
        self.send(ClusterEvent::Allocated(vec![slot]))
    }

    async fn release(&self, id: &SlotId) -> CollaboratorResult<()> {
        debug!(slot = %id, "slot released");
        let mut completion = SlotCompletion::aborted(id.clone());
        completion.diagnostics = "released by the application master".to_string();
        self.send(ClusterEvent::Completed(vec![completion]))
    }

    async fn unregister(&self, status: FinalStatus, message: Option<&str>) -> CollaboratorResult<()> {
        self.registered.store(false, Ordering::SeqCst);
        info!(%status, message = message.unwrap_or(""), "master unregistered");
        Ok(())
    }

    async fn stop(&self) {
        debug!("local resource manager stopped");
    }
}
