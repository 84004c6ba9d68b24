use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::{debug, info, warn};

use jbyarn_core::MasterConfig;
use jbyarn_master::local::{LocalNodeAgent, LocalResourceManager};
use jbyarn_master::{ClusterEvent, DemandController, EventChannel, LocalArtifactStore};

use crate::expand_home;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Every slot runs on this machine.
    Local,
}

#[derive(Args, Debug)]
pub struct MasterArgs {
    /// Config file (TOML). Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Application id, also the server group name.
    #[arg(long)]
    pub app_id: Option<String>,

    /// Number of server instances to run.
    #[arg(long)]
    pub num_containers: Option<u32>,

    /// Memory per container, in MB.
    #[arg(long)]
    pub container_memory: Option<u64>,

    /// Priority of the slot requests.
    #[arg(long)]
    pub priority: Option<i32>,

    #[arg(long)]
    pub admin_user: Option<String>,

    #[arg(long)]
    pub admin_password: Option<String>,

    /// Location of the jbyarn binary shipped into each container.
    #[arg(long)]
    pub app_artifact: Option<String>,

    /// Location of the server distribution archive.
    #[arg(long)]
    pub dist_artifact: Option<String>,

    /// Root of the containers' local directories.
    #[arg(long)]
    pub local_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "local")]
    pub backend: Backend,

    /// Debug logging plus a dump of the environment and working directory.
    #[arg(long)]
    pub debug: bool,
}

impl MasterArgs {
    /// Load the config file (or defaults) and apply flag overrides.
    pub fn resolve_config(&self) -> anyhow::Result<MasterConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = expand_home(path.clone());
                MasterConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?
            }
            None => MasterConfig::default(),
        };

        if let Some(app_id) = &self.app_id {
            config.app_id = app_id.clone();
        }
        if let Some(n) = self.num_containers {
            config.num_containers = n;
        }
        if let Some(mb) = self.container_memory {
            config.container_memory_mb = mb;
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        if let Some(user) = &self.admin_user {
            config.admin_user = user.clone();
        }
        if let Some(password) = &self.admin_password {
            config.admin_password = password.clone();
        }
        if let Some(app) = &self.app_artifact {
            config.app_artifact = Some(app.clone());
        }
        if let Some(dist) = &self.dist_artifact {
            config.dist_artifact = dist.clone();
        }
        if let Some(dir) = &self.local_dir {
            config.local_dir = expand_home(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run(args: MasterArgs) -> anyhow::Result<ExitCode> {
    let config = args.resolve_config()?;
    if args.debug {
        dump_environment();
        debug!(config = %config.to_toml_string()?, "effective configuration");
    }

    let channel = EventChannel::new();
    let controller = match args.backend {
        Backend::Local => {
            let rm = LocalResourceManager::new(config.local.clone(), &config.app_id, channel.sender());
            let agent =
                LocalNodeAgent::new(&config.local_dir, &config.user, &config.app_id, channel.sender());
            let shutdown = channel.sender();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing");
                    let _ = shutdown.send(ClusterEvent::ShutdownRequested);
                }
            });
            DemandController::new(
                config,
                Arc::new(rm),
                Arc::new(agent),
                Arc::new(LocalArtifactStore),
                channel,
            )?
        }
    };

    let mut progress = controller.subscribe();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = *progress.borrow();
            debug!(progress = state.progress(), %state, "progress");
        }
    });

    let report = controller.run().await?;
    info!(status = %report.status, state = %report.state, "application master finished");
    println!("{}", serde_json::to_string(&report)?);

    Ok(ExitCode::from(report.exit_code() as u8))
}

fn dump_environment() {
    for (key, value) in std::env::vars() {
        debug!(%key, %value, "environment");
    }
    match std::env::current_dir().and_then(std::fs::read_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                debug!(path = %entry.path().display(), "working directory entry");
            }
        }
        Err(e) => warn!(error = %e, "cannot list working directory"),
    }
}
