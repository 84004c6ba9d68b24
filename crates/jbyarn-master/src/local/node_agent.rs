use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jbyarn_core::constants::LAUNCH_FAILED_EXIT_STATUS;
use jbyarn_core::{ArtifactUri, LaunchSpec, LocalResource, ResourceKind, SlotAllocation, SlotCompletion, SlotId};

use crate::collaborator::NodeAgent;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::events::{ClusterEvent, EventSender};
use crate::launch::container_home;

/// How long `shutdown` waits for each killed slot to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningSlot {
    kill_tx: oneshot::Sender<()>,
    watcher: JoinHandle<()>,
}

type RunningSlots = Arc<Mutex<HashMap<SlotId, RunningSlot>>>;

/// Runs slot commands as local child processes.
pub struct LocalNodeAgent {
    local_dir: PathBuf,
    user: String,
    app_id: String,
    events: EventSender,
    running: RunningSlots,
    closed: AtomicBool,
}

impl LocalNodeAgent {
    pub fn new(local_dir: impl Into<PathBuf>, user: &str, app_id: &str, events: EventSender) -> Self {
        Self {
            local_dir: local_dir.into(),
            user: user.to_string(),
            app_id: app_id.to_string(),
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of slot processes still running.
    pub async fn running(&self) -> usize {
        self.running.lock().await.len()
    }

    async fn spawn_slot(&self, slot: &SlotAllocation, spec: LaunchSpec) -> CollaboratorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("node agent is shut down".to_string()));
        }

        let home = container_home(&self.local_dir, &self.user, &self.app_id, &slot.id);
        tokio::fs::create_dir_all(&home).await?;
        for (link, resource) in &spec.resources {
            localize(&home, link, resource).await?;
        }

        let stdout = std::fs::File::create(home.join("stdout"))?;
        let stderr = std::fs::File::create(home.join("stderr"))?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(spec.command_line())
            .envs(&spec.env)
            .current_dir(&home)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()?;

        info!(slot = %slot.id, pid = child.id(), home = %home.display(), "slot process started");

        // Held until the watcher is tracked, so a fast exit cannot race
        // the insert and `Started` always precedes the completion.
        let mut running = self.running.lock().await;
        let _ = self.events.send(ClusterEvent::Started(slot.id.clone()));

        let (kill_tx, kill_rx) = oneshot::channel();
        let id = slot.id.clone();
        let events = self.events.clone();
        let tracked = Arc::clone(&self.running);
        let watcher = tokio::spawn(async move {
            let completion = tokio::select! {
                status = child.wait() => {
                    tracked.lock().await.remove(&id);
                    match status {
                        Ok(status) => SlotCompletion::exited(id.clone(), exit_code(status)),
                        Err(e) => {
                            error!(slot = %id, error = %e, "failed to wait for slot process");
                            SlotCompletion::aborted(id.clone())
                        }
                    }
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(slot = %id, error = %e, "failed to kill slot process");
                    }
                    let _ = events.send(ClusterEvent::Stopped(id.clone()));
                    let mut completion = SlotCompletion::aborted(id.clone());
                    completion.diagnostics = "stopped by the application master".to_string();
                    completion
                }
            };
            debug!(slot = %id, exit_code = completion.exit_code, "slot process exited");
            let _ = events.send(ClusterEvent::Completed(vec![completion]));
        });

        running.insert(slot.id.clone(), RunningSlot { kill_tx, watcher });
        Ok(())
    }
}

#[async_trait]
impl NodeAgent for LocalNodeAgent {
    async fn start(&self, slot: &SlotAllocation, spec: LaunchSpec) {
        if let Err(e) = self.spawn_slot(slot, spec).await {
            warn!(slot = %slot.id, error = %e, "slot failed to start");
            let _ = self.events.send(ClusterEvent::StartFailed {
                id: slot.id.clone(),
                cause: e.to_string(),
            });
            // The container is gone; report it the way the resource
            // manager reports a container that never ran.
            let mut completion = SlotCompletion::exited(slot.id.clone(), LAUNCH_FAILED_EXIT_STATUS);
            completion.diagnostics = format!("launch failed: {e}");
            let _ = self.events.send(ClusterEvent::Completed(vec![completion]));
        }
    }

    async fn status(&self, slot: &SlotAllocation) {
        let event = if self.running.lock().await.contains_key(&slot.id) {
            ClusterEvent::StatusReceived {
                id: slot.id.clone(),
                state: "RUNNING".to_string(),
            }
        } else {
            ClusterEvent::StatusFailed {
                id: slot.id.clone(),
                cause: "no such running slot".to_string(),
            }
        };
        let _ = self.events.send(event);
    }

    async fn stop_slot(&self, slot: &SlotAllocation) {
        let entry = self.running.lock().await.remove(&slot.id);
        match entry {
            Some(entry) => {
                let _ = entry.kill_tx.send(());
            }
            None => {
                let _ = self.events.send(ClusterEvent::StopFailed {
                    id: slot.id.clone(),
                    cause: "no such running slot".to_string(),
                });
            }
        }
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let entries: Vec<(SlotId, RunningSlot)> = self.running.lock().await.drain().collect();
        info!(count = entries.len(), "stopping slot processes");

        for (id, entry) in entries {
            let _ = entry.kill_tx.send(());
            if tokio::time::timeout(REAP_TIMEOUT, entry.watcher).await.is_err() {
                warn!(slot = %id, "slot process not reaped in time");
            }
        }
    }
}

/// Make `resource` available as `home/link`.
///
/// Files and directories are linked. Archive files are unpacked into a
/// directory of that name.
async fn localize(home: &Path, link: &str, resource: &LocalResource) -> CollaboratorResult<()> {
    let uri = ArtifactUri::parse(&resource.location)
        .map_err(|e| CollaboratorError::UnsupportedArtifact(e.to_string()))?;
    let source = uri
        .local_path()
        .ok_or_else(|| CollaboratorError::UnsupportedArtifact(resource.location.clone()))?;
    let source = tokio::fs::canonicalize(source)
        .await
        .map_err(|_| CollaboratorError::ArtifactNotFound(resource.location.clone()))?;
    let target = home.join(link);

    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        debug!(target = %target.display(), "resource already localized");
        return Ok(());
    }

    if resource.kind == ResourceKind::Archive && source.is_file() {
        tokio::fs::create_dir_all(&target).await?;
        let status = Command::new("tar")
            .arg("-xf")
            .arg(&source)
            .arg("-C")
            .arg(&target)
            .status()
            .await?;
        if !status.success() {
            return Err(CollaboratorError::Io(format!(
                "unpacking {} exited with {status}",
                source.display()
            )));
        }
    } else {
        tokio::fs::symlink(&source, &target).await?;
    }
    debug!(%link, source = %source.display(), "resource localized");
    Ok(())
}

/// Shell convention: killed by signal N exits with 128 + N.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}
