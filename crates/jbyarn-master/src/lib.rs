//! jbyarn-master: application master for a domain-mode server cluster.
//!
//! Asks the cluster's resource manager for a fixed number of slots,
//! launches one server in each, elects the first registrant as domain
//! controller, and reports the aggregate outcome when every slot has
//! completed.
//!
//! # Architecture
//!
//! ```text
//! DemandController (single reconciliation loop)
//!   ├── EventChannel ◄── ResourceManager / NodeAgent / launch tasks
//!   ├── DemandState  desired / requested / allocated / completed / failed
//!   └── LaunchCoordinator
//!       ├── one task per slot (resolve artifacts, register, start)
//!       └── InstanceRegistry (role + port offset per slot)
//! ```
//!
//! [`local`] provides a resource manager and node agent that run
//! everything on the current machine.

pub mod collaborator;
pub mod demand;
pub mod error;
pub mod events;
pub mod launch;
pub mod local;
pub mod registry;

pub use collaborator::{ArtifactStatus, ArtifactStore, LocalArtifactStore, NodeAgent, ResourceManager};
pub use demand::{DemandController, DemandState, Phase, RunReport};
pub use error::{CollaboratorError, CollaboratorResult, MasterError, MasterResult};
pub use events::{ClusterEvent, EventChannel, EventReceiver, EventSender};
pub use launch::{LaunchCoordinator, LaunchSettings, build_launch_spec, container_home};
pub use registry::{InstanceRecord, InstanceRegistry, Role};
