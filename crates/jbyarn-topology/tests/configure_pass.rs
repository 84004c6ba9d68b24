//! Configuration pass integration tests.
//!
//! Runs full passes against a stock-like distribution layout in a
//! temporary directory, including several instances configuring the same
//! home concurrently.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use jbyarn_topology::{
    ControllerMode, DomainLayout, FileLocks, TopologyDocument, TopologySettings, TopologyWriter,
};
use xmltree::{Element, XMLNode};

const DOMAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<domain xmlns="urn:jboss:domain:1.2">
    <profiles>
        <profile name="full-ha"/>
    </profiles>
    <socket-binding-groups>
        <socket-binding-group name="full-sockets" default-interface="public"/>
    </socket-binding-groups>
    <server-groups>
        <server-group name="main-server-group" profile="full">
            <socket-binding-group ref="full-sockets"/>
        </server-group>
    </server-groups>
</domain>
"#;

const HOST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<host name="master" xmlns="urn:jboss:domain:1.2">
    <management>
        <security-realms>
            <security-realm name="ManagementRealm">
                <authentication>
                    <properties path="mgmt-users.properties" relative-to="jboss.domain.config.dir"/>
                </authentication>
            </security-realm>
            <security-realm name="ApplicationRealm">
                <authentication>
                    <properties path="application-users.properties" relative-to="jboss.domain.config.dir"/>
                </authentication>
            </security-realm>
        </security-realms>
    </management>
    <domain-controller>
        <local/>
    </domain-controller>
    <interfaces>
        <interface name="management">
            <inet-address value="${jboss.bind.address.management:127.0.0.1}"/>
        </interface>
    </interfaces>
    <servers>
        <server name="server-one" group="main-server-group"/>
    </servers>
</host>
"#;

fn seed(home: &Path) -> DomainLayout {
    let layout = DomainLayout::new(home);
    std::fs::create_dir_all(layout.configuration_dir()).unwrap();
    std::fs::write(layout.domain_xml(), DOMAIN).unwrap();
    std::fs::write(layout.host_xml(), HOST).unwrap();
    std::fs::write(layout.mgmt_users(), "# Users for the management realm\n").unwrap();
    layout
}

fn settings(home: &Path, server: &str, offset: u32, controller: &str, host: &str) -> TopologySettings {
    TopologySettings {
        home: home.to_path_buf(),
        server_group: "application_1_0001".to_string(),
        server_name: server.to_string(),
        port_offset: offset,
        admin_user: "yarn".to_string(),
        admin_password: "yarn".to_string(),
        domain_controller: controller.to_string(),
        host: host.to_string(),
    }
}

fn named<'a>(parent: &'a Element, child: &str) -> Vec<&'a Element> {
    parent
        .get_child(child)
        .map(|el| {
            el.children
                .iter()
                .filter_map(|node| match node {
                    XMLNode::Element(el) => Some(el),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn leader_pass_produces_controller_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let layout = seed(dir.path());

    let mode = TopologyWriter::default()
        .apply(&settings(dir.path(), "container_01", 0, "node-1", "node-1"))
        .unwrap();
    assert_eq!(mode, ControllerMode::Local);

    let domain = TopologyDocument::load(&layout.domain_xml()).unwrap();
    let groups = named(domain.root(), "server-groups");
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().any(|g| g.attributes["name"] == "application_1_0001"
        && g.attributes["profile"] == "full-ha"));

    let host = TopologyDocument::load(&layout.host_xml()).unwrap();
    assert_eq!(host.root_name(), Some("master"));
    let servers = named(host.root(), "servers");
    let server = servers
        .iter()
        .find(|s| s.attributes["name"] == "container_01")
        .unwrap();
    assert_eq!(server.attributes["group"], "application_1_0001");
    assert_eq!(
        server.get_child("socket-bindings").unwrap().attributes["port-offset"],
        "0"
    );

    let users = std::fs::read_to_string(layout.mgmt_users()).unwrap();
    assert!(users.starts_with("# Users for the management realm\n"));
    for user in ["yarn=", "master=", "slave="] {
        assert!(users.lines().any(|line| line.starts_with(user)), "{user} missing");
    }
}

#[test]
fn member_pass_points_at_remote_controller() {
    let dir = tempfile::tempdir().unwrap();
    let layout = seed(dir.path());

    TopologyWriter::default()
        .apply(&settings(dir.path(), "container_02", 150, "127.0.0.1", "node-2"))
        .unwrap();

    let host = TopologyDocument::load(&layout.host_xml()).unwrap();
    assert_eq!(host.root_name(), Some("slave"));
    let controller = host.root().get_child("domain-controller").unwrap();
    assert!(controller.get_child("local").is_none());
    let remote = controller.get_child("remote").unwrap();
    assert_eq!(remote.attributes["host"], "127.0.0.1");
    assert_eq!(remote.attributes["port"], "9999");

    let xml = host.to_xml_string().unwrap();
    assert!(xml.contains("c2xhdmU="));

    let users = std::fs::read_to_string(layout.mgmt_users()).unwrap();
    assert!(!users.lines().any(|line| line.starts_with("master=")));
}

#[test]
fn repeated_pass_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let layout = seed(dir.path());
    let writer = TopologyWriter::default();
    let s = settings(dir.path(), "container_01", 0, "node-1", "node-1");

    writer.apply(&s).unwrap();
    let first_host = TopologyDocument::load(&layout.host_xml()).unwrap();
    let first_domain = TopologyDocument::load(&layout.domain_xml()).unwrap();
    let first_users = std::fs::read_to_string(layout.mgmt_users()).unwrap();
    writer.apply(&s).unwrap();

    assert_eq!(TopologyDocument::load(&layout.host_xml()).unwrap(), first_host);
    assert_eq!(TopologyDocument::load(&layout.domain_xml()).unwrap(), first_domain);
    assert_eq!(std::fs::read_to_string(layout.mgmt_users()).unwrap(), first_users);
}

#[test]
fn concurrent_passes_on_one_home_lose_no_servers() {
    let dir = tempfile::tempdir().unwrap();
    let layout = seed(dir.path());
    let writer = Arc::new(TopologyWriter::new(FileLocks::new()));

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let writer = Arc::clone(&writer);
            let home = dir.path().to_path_buf();
            thread::spawn(move || {
                let s = settings(&home, &format!("container_{i:02}"), i * 150, "node-1", "node-1");
                writer.apply(&s).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let host = TopologyDocument::load(&layout.host_xml()).unwrap();
    let servers = named(host.root(), "servers");
    // eight slots plus the stock server-one
    assert_eq!(servers.len(), 9);
    let controllers = host
        .root()
        .children
        .iter()
        .filter(|node| matches!(node, XMLNode::Element(el) if el.name == "domain-controller"))
        .count();
    assert_eq!(controllers, 1);

    let domain = TopologyDocument::load(&layout.domain_xml()).unwrap();
    assert_eq!(named(domain.root(), "server-groups").len(), 2);
}
