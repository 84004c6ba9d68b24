//! jbyarn-core: shared types for bringing up a clustered application
//! server on a shared compute cluster.
//!
//! - [`config`]: `jbyarn.toml` parsing and validation for the master
//! - [`constants`]: fixed names of the server distribution and topology
//! - [`source`]: typed artifact locations
//! - [`types`]: slots, completions, launch specifications

pub mod config;
pub mod constants;
pub mod source;
pub mod types;

pub use config::{ConfigError, LocalBackendConfig, MasterConfig};
pub use source::{ArtifactError, ArtifactUri};
pub use types::*;
