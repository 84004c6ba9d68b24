//! Single-machine backend.
//!
//! [`LocalResourceManager`] grants every request immediately on one host.
//! [`LocalNodeAgent`] localizes a slot's resources into its working
//! directory and runs the launch command with `sh -c`, reporting the
//! process exit as a completion.

mod node_agent;
mod resource_manager;

pub use node_agent::LocalNodeAgent;
pub use resource_manager::LocalResourceManager;
