//! The configuration pass run once per instance before its server
//! starts.

use std::path::{Path, PathBuf};

use tracing::info;

use jbyarn_core::constants::{
    MANAGEMENT_REALM, MASTER_PASSWORD, MASTER_USER, SLAVE_PASSWORD, SLAVE_USER,
};

use crate::document::TopologyDocument;
use crate::error::TopologyResult;
use crate::layout::DomainLayout;
use crate::lock::{FileLocks, lock_ignoring_poison};
use crate::users;
use crate::writer::{ControllerMode, add_domain_controller, add_server, add_server_group};

/// Everything one instance's configuration pass needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySettings {
    /// Server home (the unpacked distribution).
    pub home: PathBuf,
    pub server_group: String,
    pub server_name: String,
    pub port_offset: u32,
    pub admin_user: String,
    pub admin_password: String,
    /// Host of the domain controller.
    pub domain_controller: String,
    /// Host this instance runs on.
    pub host: String,
}

/// Applies configuration passes, serializing writers per file.
#[derive(Debug, Clone, Default)]
pub struct TopologyWriter {
    locks: FileLocks,
}

impl TopologyWriter {
    pub fn new(locks: FileLocks) -> Self {
        Self { locks }
    }

    /// Run the full pass: admin user, server group, server, controller.
    ///
    /// Returns the controller mode that was written.
    pub fn apply(&self, settings: &TopologySettings) -> TopologyResult<ControllerMode> {
        let layout = DomainLayout::new(&settings.home);
        info!(
            home = %layout.home().display(),
            server = %settings.server_name,
            group = %settings.server_group,
            port_offset = settings.port_offset,
            controller = %settings.domain_controller,
            host = %settings.host,
            "configuring server"
        );

        self.add_user(
            &layout.mgmt_users(),
            &settings.admin_user,
            &settings.admin_password,
        )?;

        self.patch(&layout.domain_xml(), |doc| {
            add_server_group(doc, &settings.server_group);
            Ok(())
        })?;

        self.patch(&layout.host_xml(), |doc| {
            add_server(
                doc,
                &settings.server_group,
                &settings.server_name,
                settings.port_offset,
            );
            Ok(())
        })?;

        let mode = ControllerMode::resolve(&settings.domain_controller, &settings.host)?;
        if mode.is_local() {
            self.add_user(&layout.mgmt_users(), MASTER_USER, MASTER_PASSWORD)?;
            self.add_user(&layout.mgmt_users(), SLAVE_USER, SLAVE_PASSWORD)?;
        }
        self.patch(&layout.host_xml(), |doc| add_domain_controller(doc, &mode))?;

        Ok(mode)
    }

    /// Load, transform, and atomically rewrite one document while holding
    /// its lock.
    pub fn patch<F>(&self, path: &Path, transform: F) -> TopologyResult<()>
    where
        F: FnOnce(&mut TopologyDocument) -> TopologyResult<()>,
    {
        let lock = self.locks.lock_for(path);
        let _guard = lock_ignoring_poison(&lock);

        let mut doc = TopologyDocument::load(path)?;
        transform(&mut doc)?;
        doc.save(path)
    }

    fn add_user(&self, path: &Path, user: &str, password: &str) -> TopologyResult<()> {
        let lock = self.locks.lock_for(path);
        let _guard = lock_ignoring_poison(&lock);
        users::add_user(path, user, password, MANAGEMENT_REALM)
    }
}
