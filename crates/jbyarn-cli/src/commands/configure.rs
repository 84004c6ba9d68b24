use std::path::PathBuf;

use clap::Args;
use tracing::info;

use jbyarn_topology::{TopologySettings, TopologyWriter};

use crate::expand_home;

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Server home (the unpacked distribution).
    #[arg(long)]
    pub home: PathBuf,

    #[arg(long)]
    pub server_group: String,

    /// Server name, unique within the host.
    #[arg(long)]
    pub server: String,

    #[arg(long)]
    pub port_offset: u32,

    #[arg(long)]
    pub admin_user: String,

    #[arg(long)]
    pub admin_password: String,

    /// Host of the domain controller.
    #[arg(long)]
    pub domain_controller: String,

    /// Host this instance runs on.
    #[arg(long)]
    pub host: String,
}

impl From<ConfigureArgs> for TopologySettings {
    fn from(args: ConfigureArgs) -> Self {
        TopologySettings {
            home: expand_home(args.home),
            server_group: args.server_group,
            server_name: args.server,
            port_offset: args.port_offset,
            admin_user: args.admin_user,
            admin_password: args.admin_password,
            domain_controller: args.domain_controller,
            host: args.host,
        }
    }
}

pub fn run(args: ConfigureArgs) -> anyhow::Result<()> {
    let settings = TopologySettings::from(args);
    let mode = TopologyWriter::default().apply(&settings)?;
    info!(
        server = %settings.server_name,
        local_controller = mode.is_local(),
        "configuration written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use jbyarn_topology::{DomainLayout, TopologyDocument};

    #[test]
    fn configure_writes_host_document() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DomainLayout::new(dir.path());
        std::fs::create_dir_all(layout.configuration_dir()).unwrap();
        std::fs::write(layout.domain_xml(), "<domain><server-groups/></domain>").unwrap();
        std::fs::write(
            layout.host_xml(),
            "<host name=\"master\"><management/><interfaces/><servers/></host>",
        )
        .unwrap();

        let args = ConfigureArgs {
            home: dir.path().to_path_buf(),
            server_group: "g1".to_string(),
            server: "container_01".to_string(),
            port_offset: 0,
            admin_user: "yarn".to_string(),
            admin_password: "yarn".to_string(),
            domain_controller: "node-1".to_string(),
            host: "node-1".to_string(),
        };
        run(args).unwrap();

        let host = TopologyDocument::load(&layout.host_xml()).unwrap();
        assert_eq!(host.root_name(), Some("master"));
        assert!(host.to_xml_string().unwrap().contains("container_01"));
    }

    #[test]
    fn configure_fails_without_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigureArgs {
            home: dir.path().join("missing"),
            server_group: "g1".to_string(),
            server: "s".to_string(),
            port_offset: 0,
            admin_user: "yarn".to_string(),
            admin_password: "yarn".to_string(),
            domain_controller: "node-1".to_string(),
            host: "node-1".to_string(),
        };
        assert!(run(args).is_err());
    }
}
