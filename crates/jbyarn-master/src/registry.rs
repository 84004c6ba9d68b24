//! Which slot runs where, and in which role.
//!
//! The first slot to register in a run becomes the domain controller
//! (leader). Port offsets come from the registry size at registration,
//! skipping any offset still held by a live instance.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use jbyarn_core::SlotId;
use jbyarn_core::constants::PORT_OFFSET_STEP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Leader,
    Follower,
}

/// A registered instance. Never changes after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
    pub id: SlotId,
    pub host: String,
    pub role: Role,
    pub port_offset: u32,
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<SlotId, InstanceRecord>,
    /// First registrant of the run. Kept after it unregisters.
    leader: Option<InstanceRecord>,
}

/// Concurrent map from slot identity to its instance record.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    state: RwLock<RegistryState>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` on `host`, or return its existing record.
    pub async fn register(&self, id: &SlotId, host: &str) -> InstanceRecord {
        let mut state = self.state.write().await;
        if let Some(existing) = state.records.get(id) {
            debug!(slot = %id, "instance already registered");
            return existing.clone();
        }

        let role = if state.leader.is_none() {
            Role::Leader
        } else {
            Role::Follower
        };

        let mut port_offset = PORT_OFFSET_STEP * state.records.len() as u32;
        while state.records.values().any(|r| r.port_offset == port_offset) {
            port_offset += PORT_OFFSET_STEP;
        }

        let record = InstanceRecord {
            id: id.clone(),
            host: host.to_string(),
            role,
            port_offset,
        };
        if role == Role::Leader {
            state.leader = Some(record.clone());
        }
        state.records.insert(id.clone(), record.clone());

        info!(slot = %id, %host, ?role, port_offset, "instance registered");
        record
    }

    /// Remove `id`. Leadership is never reassigned.
    pub async fn unregister(&self, id: &SlotId) -> Option<InstanceRecord> {
        let mut state = self.state.write().await;
        let removed = state.records.remove(id);
        if let Some(record) = &removed {
            if record.role == Role::Leader {
                warn!(slot = %id, host = %record.host, "domain controller instance removed, no re-election");
            } else {
                debug!(slot = %id, "instance unregistered");
            }
        }
        removed
    }

    pub async fn get(&self, id: &SlotId) -> Option<InstanceRecord> {
        self.state.read().await.records.get(id).cloned()
    }

    pub async fn contains(&self, id: &SlotId) -> bool {
        self.state.read().await.records.contains_key(id)
    }

    /// Number of live instances.
    pub async fn count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Host of the first registrant, even if it has since gone away.
    pub async fn leader_host(&self) -> Option<String> {
        self.state
            .read()
            .await
            .leader
            .as_ref()
            .map(|leader| leader.host.clone())
    }
}
