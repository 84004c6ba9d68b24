//! Turns each granted slot into a running server.
//!
//! One task per slot resolves the shipped artifacts, registers the
//! instance, builds the command line, and dispatches the start request
//! to the node agent. Node agent results come back through the
//! reconciliation loop, which forwards them to the `on_*` handlers here.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jbyarn_core::constants::{APP_LINK, DIST_LINK, SERVER_VERSION};
use jbyarn_core::{
    ArtifactUri, ConfigError, LaunchSpec, LocalResource, MasterConfig, ResourceKind, SlotAllocation,
    SlotId, Visibility,
};

use crate::collaborator::{ArtifactStore, NodeAgent};
use crate::error::{CollaboratorResult, MasterError, MasterResult};
use crate::events::{ClusterEvent, EventSender};
use crate::registry::{InstanceRecord, InstanceRegistry};

/// What every launch needs, independent of the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Application id; also the server group name.
    pub app_id: String,
    pub admin_user: String,
    pub admin_password: String,
    pub local_dir: PathBuf,
    pub user: String,
    pub env: BTreeMap<String, String>,
    pub app_artifact: ArtifactUri,
    pub dist_artifact: ArtifactUri,
}

impl LaunchSettings {
    pub fn from_config(config: &MasterConfig) -> MasterResult<Self> {
        let app = config.app_artifact.as_deref().ok_or_else(|| {
            MasterError::Config(ConfigError::Invalid(
                "no application artifact specified".to_string(),
            ))
        })?;
        Ok(Self {
            app_id: config.app_id.clone(),
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
            local_dir: config.local_dir.clone(),
            user: config.user.clone(),
            env: config.env.clone(),
            app_artifact: ArtifactUri::parse(app)?,
            dist_artifact: ArtifactUri::parse(&config.dist_artifact)?,
        })
    }

    /// Working directory of `slot` on its host.
    pub fn container_home(&self, slot: &SlotId) -> PathBuf {
        container_home(&self.local_dir, &self.user, &self.app_id, slot)
    }

    /// Unpacked server distribution inside the slot.
    pub fn server_home(&self, slot: &SlotId) -> PathBuf {
        self.container_home(slot).join(DIST_LINK).join(SERVER_VERSION)
    }
}

/// `{local_dir}/usercache/{user}/appcache/{app_id}/{slot}`
pub fn container_home(local_dir: &Path, user: &str, app_id: &str, slot: &SlotId) -> PathBuf {
    local_dir
        .join("usercache")
        .join(user)
        .join("appcache")
        .join(app_id)
        .join(slot.as_str())
}

/// Build the environment, resources, and chained commands for one slot.
pub fn build_launch_spec(
    settings: &LaunchSettings,
    slot: &SlotAllocation,
    record: &InstanceRecord,
    controller_host: &str,
    resources: BTreeMap<String, LocalResource>,
) -> LaunchSpec {
    let container_home = settings.container_home(&slot.id);
    let home = settings.server_home(&slot.id);
    let host = &slot.host;

    let mut spec = LaunchSpec {
        env: settings.env.clone(),
        resources,
        commands: Vec::new(),
    };
    spec.push_command(format!("chmod -R 777 {}", home.display()));
    spec.push_command(format!(
        "{} configure --home {} --server-group {} --server {} --port-offset {} \
         --admin-user {} --admin-password {} --domain-controller {} --host {}",
        container_home.join(APP_LINK).display(),
        home.display(),
        settings.app_id,
        slot.id,
        record.port_offset,
        settings.admin_user,
        settings.admin_password,
        controller_host,
        host,
    ));
    spec.push_command(format!(
        "{}/bin/domain.sh -Djboss.bind.address={host} \
         -Djboss.bind.address.management={host} -Djboss.bind.address.unsecure={host}",
        home.display(),
    ));
    spec
}

/// Shared by every launch task.
struct LaunchContext {
    settings: LaunchSettings,
    registry: Arc<InstanceRegistry>,
    agent: Arc<dyn NodeAgent>,
    store: Arc<dyn ArtifactStore>,
    events: EventSender,
}

pub struct LaunchCoordinator {
    ctx: Arc<LaunchContext>,
    /// Slots handed to `launch` and not yet completed.
    slots: HashMap<SlotId, SlotAllocation>,
    workers: Vec<(SlotId, JoinHandle<()>)>,
}

impl LaunchCoordinator {
    pub fn new(
        settings: LaunchSettings,
        registry: Arc<InstanceRegistry>,
        agent: Arc<dyn NodeAgent>,
        store: Arc<dyn ArtifactStore>,
        events: EventSender,
    ) -> Self {
        Self {
            ctx: Arc::new(LaunchContext {
                settings,
                registry,
                agent,
                store,
                events,
            }),
            slots: HashMap::new(),
            workers: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.ctx.registry
    }

    /// Spawn the launch task for `slot`.
    pub fn launch(&mut self, slot: SlotAllocation) {
        self.workers.retain(|(_, handle)| !handle.is_finished());

        info!(
            slot = %slot.id,
            host = %slot.host,
            node_port = slot.node_port,
            memory_mb = slot.resource.memory_mb,
            "launching server on new slot"
        );
        self.slots.insert(slot.id.clone(), slot.clone());

        let id = slot.id.clone();
        let ctx = Arc::clone(&self.ctx);
        let handle = tokio::spawn(async move {
            launch_slot(ctx, slot).await;
        });
        self.workers.push((id, handle));
    }

    /// Drop local tracking of a slot that reached a terminal state.
    pub fn forget(&mut self, id: &SlotId) -> Option<SlotAllocation> {
        self.slots.remove(id)
    }

    /// Launch tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.workers.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    pub async fn on_started(&self, id: &SlotId) {
        debug!(slot = %id, "slot started");
        if !self.ctx.registry.contains(id).await {
            return;
        }
        if let Some(slot) = self.slots.get(id) {
            self.ctx.agent.status(slot).await;
        }
    }

    pub async fn on_start_failed(&self, id: &SlotId, cause: &str) {
        error!(slot = %id, %cause, "failed to start slot");
        self.ctx.registry.unregister(id).await;
    }

    pub fn on_status_received(&self, id: &SlotId, state: &str) {
        debug!(slot = %id, %state, "slot status");
    }

    pub fn on_status_failed(&self, id: &SlotId, cause: &str) {
        error!(slot = %id, %cause, "failed to query slot status");
    }

    pub async fn on_stopped(&self, id: &SlotId) {
        debug!(slot = %id, "slot stopped");
        self.ctx.registry.unregister(id).await;
    }

    pub async fn on_stop_failed(&self, id: &SlotId, cause: &str) {
        error!(slot = %id, %cause, "failed to stop slot");
        self.ctx.registry.unregister(id).await;
    }

    /// Wait for every launch task, at most `per_worker` each.
    ///
    /// Returns how many joined in time. A task that does not is left
    /// running and logged.
    pub async fn join_all(&mut self, per_worker: Duration) -> usize {
        let mut joined = 0;
        for (id, handle) in self.workers.drain(..) {
            match tokio::time::timeout(per_worker, handle).await {
                Ok(Ok(())) => joined += 1,
                Ok(Err(e)) => error!(slot = %id, error = %e, "launch task panicked"),
                Err(_) => warn!(slot = %id, timeout = ?per_worker, "launch task did not finish in time"),
            }
        }
        joined
    }

    /// Stop the node agent and every slot it runs.
    pub async fn shutdown(&self) {
        info!("stopping running slots");
        self.ctx.agent.shutdown().await;
    }
}

async fn launch_slot(ctx: Arc<LaunchContext>, slot: SlotAllocation) {
    let resources = match resolve_resources(&ctx).await {
        Ok(resources) => resources,
        Err(e) => {
            error!(slot = %slot.id, error = %e, "problem setting local resources");
            let _ = ctx.events.send(ClusterEvent::LaunchAborted {
                id: slot.id.clone(),
                reason: e.to_string(),
            });
            return;
        }
    };

    let record = ctx.registry.register(&slot.id, &slot.host).await;
    let controller = ctx
        .registry
        .leader_host()
        .await
        .unwrap_or_else(|| slot.host.clone());

    let spec = build_launch_spec(&ctx.settings, &slot, &record, &controller, resources);
    info!(
        slot = %slot.id,
        host = %slot.host,
        role = ?record.role,
        port_offset = record.port_offset,
        controller = %controller,
        "dispatching start request"
    );
    debug!(slot = %slot.id, command = %spec.command_line(), "launch command");

    ctx.agent.start(&slot, spec).await;
}

async fn resolve_resources(ctx: &LaunchContext) -> CollaboratorResult<BTreeMap<String, LocalResource>> {
    let settings = &ctx.settings;
    let mut resources = BTreeMap::new();
    for (link, uri, kind) in [
        (DIST_LINK, &settings.dist_artifact, ResourceKind::Archive),
        (APP_LINK, &settings.app_artifact, ResourceKind::File),
    ] {
        let status = ctx.store.stat(uri).await?;
        resources.insert(
            link.to_string(),
            LocalResource {
                kind,
                visibility: Visibility::Application,
                location: uri.to_string(),
                size: status.size,
                modified_ms: status.modified_ms,
            },
        );
    }
    Ok(resources)
}
