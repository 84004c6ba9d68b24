//! File layout of a server distribution in domain mode.

use std::path::{Path, PathBuf};

/// Paths of the configuration files under one server home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainLayout {
    home: PathBuf,
}

impl DomainLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn configuration_dir(&self) -> PathBuf {
        self.home.join("domain").join("configuration")
    }

    /// Cluster-wide document holding server-group definitions.
    pub fn domain_xml(&self) -> PathBuf {
        self.configuration_dir().join("domain.xml")
    }

    /// Per-host document holding servers and the domain controller.
    pub fn host_xml(&self) -> PathBuf {
        self.configuration_dir().join("host.xml")
    }

    pub fn mgmt_users(&self) -> PathBuf {
        self.configuration_dir().join("mgmt-users.properties")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_under_domain_configuration() {
        let layout = DomainLayout::new("/srv/jboss-as-7.1.1.Final");
        assert_eq!(
            layout.host_xml(),
            PathBuf::from("/srv/jboss-as-7.1.1.Final/domain/configuration/host.xml")
        );
        assert_eq!(
            layout.mgmt_users(),
            PathBuf::from("/srv/jboss-as-7.1.1.Final/domain/configuration/mgmt-users.properties")
        );
    }
}
