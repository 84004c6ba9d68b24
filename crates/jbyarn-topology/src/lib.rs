//! jbyarn-topology: persists the cluster topology into the server's
//! configuration files.
//!
//! Every instance runs one configuration pass before its server process
//! starts. The pass registers the instance's server group and server
//! entry, and points the host at its domain controller.
//!
//! # Architecture
//!
//! ```text
//! TopologyWriter::apply(TopologySettings)
//!   ├── users      mgmt-users.properties  (admin + master/slave credentials)
//!   ├── writer     domain.xml             (server group)
//!   ├── writer     host.xml               (server, domain controller)
//!   └── FileLocks  one guard per file for the whole read/transform/write
//! ```
//!
//! Documents are loaded, patched in memory, and written back through a
//! temporary file that replaces the original atomically.

pub mod document;
pub mod error;
pub mod layout;
pub mod lock;
pub mod pass;
pub mod users;
pub mod writer;

pub use document::TopologyDocument;
pub use error::{TopologyError, TopologyResult};
pub use layout::DomainLayout;
pub use lock::FileLocks;
pub use pass::{TopologySettings, TopologyWriter};
pub use writer::{ControllerMode, add_domain_controller, add_server, add_server_group};
