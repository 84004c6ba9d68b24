//! jbyarn.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_CONTAINER_VCORES, DEFAULT_DIST_ARTIFACT};
use crate::source::ArtifactUri;
use crate::types::Resource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one run of the application master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    /// Application id; doubles as the server group name.
    pub app_id: String,
    pub num_containers: u32,
    pub container_memory_mb: u64,
    pub container_vcores: u32,
    pub priority: i32,
    pub admin_user: String,
    pub admin_password: String,
    /// Location of the jbyarn binary shipped into every container.
    pub app_artifact: Option<String>,
    /// Location of the server distribution archive.
    pub dist_artifact: String,
    /// Root of the node agents' local directories.
    pub local_dir: PathBuf,
    /// User the containers run as.
    pub user: String,
    /// Bounded wait per launch worker at shutdown, in seconds.
    pub join_timeout_secs: u64,
    /// Address advertised to the resource manager on registration.
    pub rpc_host: String,
    pub rpc_port: u16,
    pub tracking_url: String,
    /// Extra environment for every container.
    pub env: BTreeMap<String, String>,
    pub local: LocalBackendConfig,
}

/// Settings of the single-machine backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalBackendConfig {
    /// Host name slots are reported on.
    pub hostname: String,
    pub max_memory_mb: u64,
    pub max_vcores: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            app_id: "jbyarn".to_string(),
            num_containers: 1,
            container_memory_mb: 1024,
            container_vcores: DEFAULT_CONTAINER_VCORES,
            priority: 0,
            admin_user: "yarn".to_string(),
            admin_password: "yarn".to_string(),
            app_artifact: None,
            dist_artifact: DEFAULT_DIST_ARTIFACT.to_string(),
            local_dir: PathBuf::from("/tmp/jbyarn/local"),
            user: std::env::var("USER").unwrap_or_else(|_| "yarn".to_string()),
            join_timeout_secs: 10,
            rpc_host: String::new(),
            rpc_port: 0,
            tracking_url: String::new(),
            env: BTreeMap::new(),
            local: LocalBackendConfig::default(),
        }
    }
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            max_memory_mb: 8192,
            max_vcores: 8,
        }
    }
}

impl MasterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MasterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the master cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_containers == 0 {
            return Err(ConfigError::Invalid(
                "cannot run the application master with no containers".to_string(),
            ));
        }
        if self.container_memory_mb == 0 {
            return Err(ConfigError::Invalid(
                "container memory must be greater than zero".to_string(),
            ));
        }
        if self.admin_user.trim().is_empty() {
            return Err(ConfigError::Invalid("admin user must not be empty".to_string()));
        }
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("app id must not be empty".to_string()));
        }
        let app = self
            .app_artifact
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("no application artifact specified".to_string()))?;
        ArtifactUri::parse(app).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        ArtifactUri::parse(&self.dist_artifact).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Resources asked for each container.
    pub fn container_resource(&self) -> Resource {
        Resource {
            memory_mb: self.container_memory_mb,
            vcores: self.container_vcores,
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}
