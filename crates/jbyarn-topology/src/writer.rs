//! Structural patches applied to the domain and host documents.
//!
//! Registrations are additive: an existing server group or server with
//! the same name is left untouched, and nothing is ever removed except a
//! previous domain-controller element, which is replaced so the host
//! document holds at most one.

use std::net::{IpAddr, ToSocketAddrs};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};
use xmltree::{Element, XMLNode};

use jbyarn_core::constants::{MANAGEMENT_REALM, REMOTE_MANAGEMENT_PORT, SLAVE_PASSWORD};

use crate::document::{
    TopologyDocument, child_or_insert, child_position, children_named, element,
    for_each_descendant_mut,
};
use crate::error::{TopologyError, TopologyResult};

/// Profile every generated server group runs.
pub const SERVER_GROUP_PROFILE: &str = "full-ha";
/// Socket binding group every generated server group uses.
pub const SOCKET_BINDING_GROUP: &str = "full-sockets";
pub const HEAP_SIZE: &str = "64m";
pub const HEAP_MAX_SIZE: &str = "512m";

/// Register `group` in the domain document.
///
/// Returns `false` when a server group of that name already exists.
pub fn add_server_group(doc: &mut TopologyDocument, group: &str) -> bool {
    let groups = child_or_insert(doc.root_mut(), "server-groups");
    if children_named(groups, "server-group").any(|g| has_name(g, group)) {
        debug!(%group, "server group already present");
        return false;
    }

    let mut jvm = element("jvm", &[("name", "default")]);
    jvm.children.push(XMLNode::Element(element(
        "heap",
        &[("size", HEAP_SIZE), ("max-size", HEAP_MAX_SIZE)],
    )));

    let mut server_group = element(
        "server-group",
        &[("name", group), ("profile", SERVER_GROUP_PROFILE)],
    );
    server_group.children.push(XMLNode::Element(jvm));
    server_group.children.push(XMLNode::Element(element(
        "socket-binding-group",
        &[("ref", SOCKET_BINDING_GROUP)],
    )));
    groups.children.push(XMLNode::Element(server_group));

    info!(%group, "server group added");
    true
}

/// Register a server bound to `group` with its port offset in the host
/// document.
///
/// Returns `false` when a server of that name already exists.
pub fn add_server(doc: &mut TopologyDocument, group: &str, server: &str, port_offset: u32) -> bool {
    let servers = child_or_insert(doc.root_mut(), "servers");
    if children_named(servers, "server").any(|s| has_name(s, server)) {
        debug!(%server, "server already present");
        return false;
    }

    let offset = port_offset.to_string();
    let mut entry = element("server", &[("name", server), ("group", group)]);
    entry.children.push(XMLNode::Element(element(
        "socket-bindings",
        &[("port-offset", offset.as_str())],
    )));
    servers.children.push(XMLNode::Element(entry));

    info!(%server, %group, port_offset, "server added");
    true
}

/// How a host reaches its domain controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerMode {
    /// This host is the domain controller.
    Local,
    /// The controller runs elsewhere, at a numeric address.
    Remote { address: IpAddr },
}

impl ControllerMode {
    /// Local when `controller_host` names this host, otherwise remote
    /// with the controller's address resolved.
    pub fn resolve(controller_host: &str, self_host: &str) -> TopologyResult<Self> {
        if controller_host == self_host {
            return Ok(ControllerMode::Local);
        }
        Ok(ControllerMode::Remote {
            address: resolve_host(controller_host)?,
        })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ControllerMode::Local)
    }
}

/// Point the host document at its domain controller.
///
/// Local mode names the host `master`. Remote mode names it `slave`,
/// adds the remote pointer, and injects the slave secret into the
/// management realm so the host can authenticate to the controller.
pub fn add_domain_controller(doc: &mut TopologyDocument, mode: &ControllerMode) -> TopologyResult<()> {
    let mut controller = element("domain-controller", &[]);

    match mode {
        ControllerMode::Local => {
            controller.children.push(XMLNode::Element(element("local", &[])));
            set_root_name(doc, "master");
        }
        ControllerMode::Remote { address } => {
            set_root_name(doc, "slave");
            let host = address.to_string();
            let port = REMOTE_MANAGEMENT_PORT.to_string();
            controller.children.push(XMLNode::Element(element(
                "remote",
                &[
                    ("host", host.as_str()),
                    ("port", port.as_str()),
                    ("security-realm", MANAGEMENT_REALM),
                ],
            )));
            inject_slave_secret(doc)?;
        }
    }

    let root = doc.root_mut();
    root.children
        .retain(|node| !matches!(node, XMLNode::Element(el) if el.name == "domain-controller"));
    let at = child_position(root, "interfaces").unwrap_or(root.children.len());
    root.children.insert(at, XMLNode::Element(controller));

    info!(local = mode.is_local(), "domain controller set");
    Ok(())
}

/// Secret value for the slave credential.
pub fn slave_secret() -> String {
    STANDARD.encode(SLAVE_PASSWORD.as_bytes())
}

fn inject_slave_secret(doc: &mut TopologyDocument) -> TopologyResult<()> {
    let root = doc.root_mut();
    let index = child_position(root, "management")
        .ok_or_else(|| TopologyError::MissingElement("management".to_string()))?;
    let XMLNode::Element(management) = &mut root.children[index] else {
        unreachable!("child_position only matches elements");
    };

    let secret = slave_secret();
    let mut injected = 0usize;
    for_each_descendant_mut(management, "security-realm", &mut |realm: &mut Element| {
        if !has_name(realm, MANAGEMENT_REALM) {
            return;
        }
        realm
            .children
            .retain(|node| !matches!(node, XMLNode::Element(el) if el.name == "server-identities"));

        let mut identities = element("server-identities", &[]);
        identities
            .children
            .push(XMLNode::Element(element("secret", &[("value", secret.as_str())])));

        let at = child_position(realm, "authentication").unwrap_or(realm.children.len());
        realm.children.insert(at, XMLNode::Element(identities));
        injected += 1;
    });

    if injected == 0 {
        return Err(TopologyError::MissingElement(format!(
            "security-realm {MANAGEMENT_REALM}"
        )));
    }
    Ok(())
}

fn set_root_name(doc: &mut TopologyDocument, name: &str) {
    doc.root_mut()
        .attributes
        .insert("name".to_string(), name.to_string());
}

fn has_name(el: &Element, name: &str) -> bool {
    el.attributes.get("name").map(String::as_str) == Some(name)
}

/// Numeric address of `host`, preferring IPv4.
pub fn resolve_host(host: &str) -> TopologyResult<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .map_err(|_| TopologyError::Resolve(host.to_string()))?
        .map(|addr| addr.ip())
        .collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TopologyError::Resolve(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = r#"<domain xmlns="urn:jboss:domain:1.2">
    <profiles/>
    <server-groups>
        <server-group name="main-server-group" profile="full"/>
    </server-groups>
</domain>"#;

    const HOST: &str = r#"<host name="master" xmlns="urn:jboss:domain:1.2">
    <management>
        <security-realms>
            <security-realm name="ManagementRealm">
                <authentication>
                    <properties path="mgmt-users.properties" relative-to="jboss.domain.config.dir"/>
                </authentication>
            </security-realm>
            <security-realm name="ApplicationRealm">
                <authentication/>
            </security-realm>
        </security-realms>
    </management>
    <domain-controller>
        <local/>
    </domain-controller>
    <interfaces/>
    <servers/>
</host>"#;

    fn child<'a>(parent: &'a Element, name: &str) -> &'a Element {
        parent.get_child(name).unwrap()
    }

    #[test]
    fn server_group_added_with_fixed_profile() {
        let mut doc = TopologyDocument::parse(DOMAIN).unwrap();
        assert!(add_server_group(&mut doc, "application_1_0001"));

        let groups = child(doc.root(), "server-groups");
        let group = children_named(groups, "server-group")
            .find(|g| has_name(g, "application_1_0001"))
            .unwrap();
        assert_eq!(group.attributes["profile"], "full-ha");
        assert_eq!(child(group, "socket-binding-group").attributes["ref"], "full-sockets");
        let heap = child(child(group, "jvm"), "heap");
        assert_eq!(heap.attributes["size"], "64m");
        assert_eq!(heap.attributes["max-size"], "512m");
    }

    #[test]
    fn server_group_is_idempotent() {
        let mut doc = TopologyDocument::parse(DOMAIN).unwrap();
        assert!(add_server_group(&mut doc, "g1"));
        assert!(!add_server_group(&mut doc, "g1"));

        let groups = child(doc.root(), "server-groups");
        assert_eq!(children_named(groups, "server-group").count(), 2);
        assert_eq!(children_named(doc.root(), "server-groups").count(), 1);
    }

    #[test]
    fn server_group_container_created_when_missing() {
        let mut doc = TopologyDocument::parse("<domain/>").unwrap();
        assert!(add_server_group(&mut doc, "g1"));
        assert!(doc.root().get_child("server-groups").is_some());
    }

    #[test]
    fn server_added_with_port_offset() {
        let mut doc = TopologyDocument::parse(HOST).unwrap();
        assert!(add_server(&mut doc, "g1", "container_01", 300));

        let servers = child(doc.root(), "servers");
        let server = children_named(servers, "server").next().unwrap();
        assert_eq!(server.attributes["name"], "container_01");
        assert_eq!(server.attributes["group"], "g1");
        assert_eq!(child(server, "socket-bindings").attributes["port-offset"], "300");

        assert!(!add_server(&mut doc, "g1", "container_01", 450));
        assert_eq!(children_named(child(doc.root(), "servers"), "server").count(), 1);
    }

    #[test]
    fn local_controller_names_root_master() {
        let mut doc = TopologyDocument::parse(HOST).unwrap();
        add_domain_controller(&mut doc, &ControllerMode::Local).unwrap();

        assert_eq!(doc.root_name(), Some("master"));
        let controller = child(doc.root(), "domain-controller");
        assert!(controller.get_child("local").is_some());
        assert!(controller.get_child("remote").is_none());

        let xml = doc.to_xml_string().unwrap();
        assert!(!xml.contains("server-identities"));
    }

    #[test]
    fn remote_controller_injects_secret_before_authentication() {
        let mut doc = TopologyDocument::parse(HOST).unwrap();
        let mode = ControllerMode::Remote {
            address: "10.0.0.7".parse().unwrap(),
        };
        add_domain_controller(&mut doc, &mode).unwrap();

        assert_eq!(doc.root_name(), Some("slave"));
        let remote = child(child(doc.root(), "domain-controller"), "remote");
        assert_eq!(remote.attributes["host"], "10.0.0.7");
        assert_eq!(remote.attributes["port"], "9999");
        assert_eq!(remote.attributes["security-realm"], "ManagementRealm");

        let realms = child(child(doc.root(), "management"), "security-realms");
        let mgmt = children_named(realms, "security-realm")
            .find(|r| has_name(r, "ManagementRealm"))
            .unwrap();
        assert_eq!(child_position(mgmt, "server-identities"), Some(0));
        assert_eq!(child_position(mgmt, "authentication"), Some(1));
        let secret = child(child(mgmt, "server-identities"), "secret");
        assert_eq!(secret.attributes["value"], "c2xhdmU=");

        let app = children_named(realms, "security-realm")
            .find(|r| has_name(r, "ApplicationRealm"))
            .unwrap();
        assert!(app.get_child("server-identities").is_none());
    }

    #[test]
    fn at_most_one_controller_element() {
        let mut doc = TopologyDocument::parse(HOST).unwrap();
        add_domain_controller(&mut doc, &ControllerMode::Local).unwrap();
        add_domain_controller(&mut doc, &ControllerMode::Local).unwrap();

        assert_eq!(children_named(doc.root(), "domain-controller").count(), 1);
        let controller_at = child_position(doc.root(), "domain-controller").unwrap();
        let interfaces_at = child_position(doc.root(), "interfaces").unwrap();
        assert_eq!(controller_at + 1, interfaces_at);
    }

    #[test]
    fn remote_controller_requires_management_realm() {
        let mut doc = TopologyDocument::parse("<host><interfaces/></host>").unwrap();
        let mode = ControllerMode::Remote {
            address: "10.0.0.7".parse().unwrap(),
        };
        assert!(matches!(
            add_domain_controller(&mut doc, &mode),
            Err(TopologyError::MissingElement(_))
        ));
    }

    #[test]
    fn resolve_mode() {
        assert_eq!(
            ControllerMode::resolve("node-1", "node-1").unwrap(),
            ControllerMode::Local
        );
        assert_eq!(
            ControllerMode::resolve("192.168.1.20", "node-2").unwrap(),
            ControllerMode::Remote {
                address: "192.168.1.20".parse().unwrap()
            }
        );
    }

    #[test]
    fn resolve_localhost_to_numeric_address() {
        let ip = resolve_host("localhost").unwrap();
        assert!(ip.is_loopback());
    }
}
