//! The application master's reconciliation loop over slot demand.
//!
//! The controller asks the resource manager for the desired number of
//! slots, hands every grant to the [`LaunchCoordinator`], and folds
//! completions back into its counters:
//!
//! - exit 0 counts as completed
//! - a non-zero exit counts as completed and failed
//! - an infrastructure abort takes the slot back out of `allocated` and
//!   `requested`, so the next reconciliation asks for a replacement
//!
//! Once every desired slot has completed (or the resource manager asks
//! for shutdown) the controller joins its launch tasks, stops the node
//! agent, and unregisters with the final status.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use jbyarn_core::{
    AllocationRequest, CompletionOutcome, FinalStatus, MasterConfig, Resource, SlotAllocation,
    SlotCompletion, SlotId,
};

use crate::collaborator::{ArtifactStore, NodeAgent, ResourceManager};
use crate::error::{MasterError, MasterResult};
use crate::events::{ClusterEvent, EventChannel, EventReceiver};
use crate::launch::{LaunchCoordinator, LaunchSettings};
use crate::registry::InstanceRegistry;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    /// Initial requests submitted, nothing granted yet.
    Requesting,
    /// Last event was a grant.
    Allocating,
    /// Last event was a completion batch.
    Completing,
    Finishing,
    Done(FinalStatus),
}

/// Slot counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemandState {
    pub desired: u32,
    pub requested: u32,
    pub allocated: u32,
    pub completed: u32,
    pub failed: u32,
}

impl DemandState {
    /// Fraction of desired slots that completed, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.desired == 0 {
            return 0.0;
        }
        (self.completed as f32 / self.desired as f32).clamp(0.0, 1.0)
    }

    pub fn final_status(&self) -> FinalStatus {
        if self.failed == 0 && self.completed == self.desired {
            FinalStatus::Succeeded
        } else {
            FinalStatus::Failed
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "Diagnostics. total={}, completed={}, allocated={}, failed={}",
            self.desired, self.completed, self.allocated, self.failed
        )
    }

    /// Slots requested but not yet granted.
    pub fn outstanding(&self) -> u32 {
        self.requested.saturating_sub(self.allocated)
    }
}

impl fmt::Display for DemandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "desired={} requested={} allocated={} completed={} failed={}",
            self.desired, self.requested, self.allocated, self.completed, self.failed
        )
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: FinalStatus,
    pub state: DemandState,
    /// Diagnostics sent with a failed status.
    pub message: Option<String>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

pub struct DemandController {
    config: MasterConfig,
    /// Per-slot ask, clamped to the cluster maximum after registration.
    resource: Resource,
    rm: Arc<dyn ResourceManager>,
    launcher: LaunchCoordinator,
    events: EventReceiver,
    state: DemandState,
    phase: Phase,
    progress: watch::Sender<DemandState>,
    /// Released or abandoned slots whose completions must not count.
    retired: HashSet<SlotId>,
}

impl DemandController {
    pub fn new(
        config: MasterConfig,
        rm: Arc<dyn ResourceManager>,
        agent: Arc<dyn NodeAgent>,
        store: Arc<dyn ArtifactStore>,
        events: EventChannel,
    ) -> MasterResult<Self> {
        let settings = LaunchSettings::from_config(&config)?;
        let (tx, rx) = events.into_parts();
        let launcher = LaunchCoordinator::new(
            settings,
            Arc::new(InstanceRegistry::new()),
            agent,
            store,
            tx,
        );
        let state = DemandState {
            desired: config.num_containers,
            ..DemandState::default()
        };
        let (progress, _) = watch::channel(state);

        Ok(Self {
            resource: config.container_resource(),
            config,
            rm,
            launcher,
            events: rx,
            state,
            phase: Phase::Init,
            progress,
            retired: HashSet::new(),
        })
    }

    pub fn registry(&self) -> Arc<InstanceRegistry> {
        Arc::clone(self.launcher.registry())
    }

    /// Counter updates, published after every event.
    pub fn subscribe(&self) -> watch::Receiver<DemandState> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> DemandState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the whole run: start, reconcile until finishing, finish.
    ///
    /// A resource manager error ends the run with `Err` and without
    /// unregistering.
    pub async fn run(mut self) -> MasterResult<RunReport> {
        self.start().await?;

        loop {
            let Some(event) = self.events.recv().await else {
                self.abort().await;
                return Err(MasterError::ChannelClosed);
            };
            match self.handle(event).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, state = %self.state, "run aborted");
                    self.abort().await;
                    return Err(e);
                }
            }
        }

        Ok(self.finish().await)
    }

    /// Register with the resource manager and submit the initial asks.
    pub async fn start(&mut self) -> MasterResult<()> {
        info!(
            app_id = %self.config.app_id,
            desired = self.state.desired,
            "starting application master"
        );
        if self.state.desired == 0 {
            return Err(MasterError::NoContainers);
        }

        let registration = self
            .rm
            .register(
                &self.config.rpc_host,
                self.config.rpc_port,
                &self.config.tracking_url,
            )
            .await
            .map_err(MasterError::Registration)?;

        let max = registration.max_capability;
        info!(max_memory_mb = max.memory_mb, max_vcores = max.vcores, "registered with resource manager");
        if self.resource.memory_mb > max.memory_mb {
            info!(
                specified = self.resource.memory_mb,
                max = max.memory_mb,
                "container memory above cluster maximum, using maximum"
            );
            self.resource.memory_mb = max.memory_mb;
        }

        self.request(self.state.desired).await?;
        self.transition(Phase::Requesting);
        self.publish();
        Ok(())
    }

    /// Apply one event. Returns `true` once the run should finish.
    pub async fn handle(&mut self, event: ClusterEvent) -> MasterResult<bool> {
        debug!(event = event.kind(), "cluster event");
        let finishing = match event {
            ClusterEvent::Allocated(slots) => {
                self.on_allocated(slots).await;
                false
            }
            ClusterEvent::Completed(completions) => self.on_completed(completions).await?,
            ClusterEvent::ShutdownRequested => {
                warn!(state = %self.state, "shutdown requested by resource manager");
                true
            }
            ClusterEvent::Error(cause) => return Err(MasterError::Collaborator(cause)),
            ClusterEvent::LaunchAborted { id, reason } => self.on_launch_aborted(id, &reason).await,
            ClusterEvent::Started(id) => {
                self.launcher.on_started(&id).await;
                false
            }
            ClusterEvent::StartFailed { id, cause } => {
                self.launcher.on_start_failed(&id, &cause).await;
                false
            }
            ClusterEvent::StatusReceived { id, state } => {
                self.launcher.on_status_received(&id, &state);
                false
            }
            ClusterEvent::StatusFailed { id, cause } => {
                self.launcher.on_status_failed(&id, &cause);
                false
            }
            ClusterEvent::Stopped(id) => {
                self.launcher.on_stopped(&id).await;
                false
            }
            ClusterEvent::StopFailed { id, cause } => {
                self.launcher.on_stop_failed(&id, &cause).await;
                false
            }
        };

        self.publish();
        if finishing {
            self.transition(Phase::Finishing);
        }
        Ok(finishing)
    }

    async fn on_allocated(&mut self, slots: Vec<SlotAllocation>) {
        self.transition(Phase::Allocating);
        info!(count = slots.len(), "slots allocated");

        let mut accepted = self.state.outstanding() as usize;
        for slot in slots {
            if accepted == 0 {
                warn!(slot = %slot.id, host = %slot.host, "more slots granted than requested, releasing");
                self.retired.insert(slot.id.clone());
                if let Err(e) = self.rm.release(&slot.id).await {
                    error!(slot = %slot.id, error = %e, "failed to release surplus slot");
                }
                continue;
            }
            accepted -= 1;
            self.state.allocated += 1;
            self.launcher.launch(slot);
        }
    }

    async fn on_completed(&mut self, completions: Vec<SlotCompletion>) -> MasterResult<bool> {
        self.transition(Phase::Completing);
        info!(count = completions.len(), "slots completed");

        for completion in completions {
            let id = &completion.id;
            if self.retired.remove(id) {
                debug!(slot = %id, "completion for retired slot ignored");
                continue;
            }
            self.launcher.forget(id);

            match completion.outcome() {
                CompletionOutcome::Succeeded => {
                    self.state.completed += 1;
                    info!(slot = %id, "slot completed successfully");
                }
                CompletionOutcome::Failed => {
                    self.state.completed += 1;
                    self.state.failed += 1;
                    warn!(
                        slot = %id,
                        exit_code = completion.exit_code,
                        diagnostics = %completion.diagnostics,
                        "slot failed"
                    );
                }
                CompletionOutcome::Aborted => {
                    self.state.allocated = self.state.allocated.saturating_sub(1);
                    self.state.requested = self.state.requested.saturating_sub(1);
                    info!(
                        slot = %id,
                        exit_code = completion.exit_code,
                        diagnostics = %completion.diagnostics,
                        "slot aborted by the infrastructure, will ask again"
                    );
                }
            }
        }

        let ask = self.state.desired.saturating_sub(self.state.requested);
        if ask > 0 {
            self.request(ask).await?;
        }

        debug!(state = %self.state, "completions reconciled");
        Ok(self.state.completed >= self.state.desired)
    }

    async fn on_launch_aborted(&mut self, id: SlotId, reason: &str) -> bool {
        if self.launcher.forget(&id).is_none() {
            debug!(slot = %id, %reason, "launch abandoned for a slot that already completed");
            return false;
        }
        error!(slot = %id, %reason, "launch abandoned");
        self.state.completed += 1;
        self.state.failed += 1;
        if let Err(e) = self.rm.release(&id).await {
            warn!(slot = %id, error = %e, "failed to release abandoned slot");
        }
        self.retired.insert(id);
        self.state.completed >= self.state.desired
    }

    async fn request(&mut self, count: u32) -> MasterResult<()> {
        let request = AllocationRequest {
            resource: self.resource,
            priority: self.config.priority,
        };
        for _ in 0..count {
            self.rm
                .add_allocation_request(request)
                .await
                .map_err(MasterError::Request)?;
        }
        self.state.requested += count;
        info!(
            count,
            memory_mb = request.resource.memory_mb,
            vcores = request.resource.vcores,
            priority = request.priority,
            "requested slots"
        );
        Ok(())
    }

    /// Join launch tasks, stop the node agent, and unregister.
    pub async fn finish(&mut self) -> RunReport {
        self.transition(Phase::Finishing);

        debug!(in_flight = self.launcher.in_flight(), "joining launch tasks");
        let joined = self.launcher.join_all(self.config.join_timeout()).await;
        debug!(joined, "launch tasks joined");
        self.launcher.shutdown().await;

        let status = self.state.final_status();
        let message = match status {
            FinalStatus::Succeeded => None,
            FinalStatus::Failed => Some(self.state.diagnostics()),
        };

        info!(%status, state = %self.state, "application completed, unregistering");
        if let Err(e) = self.rm.unregister(status, message.as_deref()).await {
            error!(error = %e, "failed to unregister application");
        }
        self.rm.stop().await;

        self.transition(Phase::Done(status));
        self.publish();
        RunReport {
            status,
            state: self.state,
            message,
        }
    }

    async fn abort(&mut self) {
        let joined = self.launcher.join_all(self.config.join_timeout()).await;
        debug!(joined, "launch tasks joined");
        self.launcher.shutdown().await;
        self.rm.stop().await;
        self.transition(Phase::Done(FinalStatus::Failed));
        self.publish();
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "phase transition");
            self.phase = next;
        }
    }

    fn publish(&self) {
        self.progress.send_replace(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_requires_all_completed_and_none_failed() {
        let done = DemandState {
            desired: 3,
            requested: 3,
            allocated: 3,
            completed: 3,
            failed: 0,
        };
        assert_eq!(done.final_status(), FinalStatus::Succeeded);
        assert_eq!(DemandState { failed: 1, ..done }.final_status(), FinalStatus::Failed);
        assert_eq!(DemandState { completed: 2, ..done }.final_status(), FinalStatus::Failed);
    }

    #[test]
    fn diagnostics_carry_counters() {
        let state = DemandState {
            desired: 2,
            requested: 2,
            allocated: 2,
            completed: 2,
            failed: 2,
        };
        assert_eq!(
            state.diagnostics(),
            "Diagnostics. total=2, completed=2, allocated=2, failed=2"
        );
    }

    #[test]
    fn progress_is_clamped() {
        let state = DemandState {
            desired: 4,
            completed: 1,
            ..DemandState::default()
        };
        assert_eq!(state.progress(), 0.25);
        assert_eq!(DemandState::default().progress(), 0.0);
        assert_eq!(DemandState { completed: 9, ..state }.progress(), 1.0);
    }

    #[test]
    fn outstanding_never_underflows() {
        let state = DemandState {
            desired: 1,
            requested: 1,
            allocated: 2,
            ..DemandState::default()
        };
        assert_eq!(state.outstanding(), 0);
    }
}
