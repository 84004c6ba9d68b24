//! In-memory configuration document.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{TopologyError, TopologyResult};

/// A configuration document loaded as a tree of elements.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyDocument {
    root: Element,
}

impl TopologyDocument {
    pub fn parse(xml: &str) -> TopologyResult<Self> {
        let mut root =
            Element::parse(xml.as_bytes()).map_err(|e| TopologyError::Parse(e.to_string()))?;
        strip_layout_whitespace(&mut root);
        Ok(Self { root })
    }

    pub fn load(path: &Path) -> TopologyResult<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| TopologyError::io(path, e))?;
        Self::parse(&xml)
    }

    pub fn to_xml_string(&self) -> TopologyResult<String> {
        let mut out = Vec::new();
        self.root
            .write_with_config(&mut out, EmitterConfig::new().perform_indent(true))
            .map_err(|e| TopologyError::Serialize(e.to_string()))?;
        String::from_utf8(out).map_err(|e| TopologyError::Serialize(e.to_string()))
    }

    /// Replace the file at `path` with this document.
    ///
    /// The new content goes to a sibling temporary file first, so readers
    /// never observe a half-written document.
    pub fn save(&self, path: &Path) -> TopologyResult<()> {
        let xml = self.to_xml_string()?;
        write_replace(path, xml.as_bytes())?;
        debug!(path = %path.display(), bytes = xml.len(), "document written");
        Ok(())
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// The `name` attribute of the root element.
    pub fn root_name(&self) -> Option<&str> {
        self.root.attributes.get("name").map(String::as_str)
    }
}

/// Write `bytes` to a sibling temporary file and rename it over `path`.
pub(crate) fn write_replace(path: &Path, bytes: &[u8]) -> TopologyResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TopologyError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| TopologyError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TopologyError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| TopologyError::io(path, e.error))?;
    Ok(())
}

/// Drop whitespace-only text nodes so re-indentation stays stable.
fn strip_layout_whitespace(element: &mut Element) {
    element.children.retain(|node| match node {
        XMLNode::Text(text) => !text.trim().is_empty(),
        _ => true,
    });
    for child in element.children.iter_mut() {
        if let XMLNode::Element(child) = child {
            strip_layout_whitespace(child);
        }
    }
}

// ── Element helpers ─────────────────────────────────────────────────

/// Element children of `parent` named `name`.
pub(crate) fn children_named<'a>(
    parent: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(el) if el.name == name => Some(el),
        _ => None,
    })
}

/// Position of the first element child named `name`.
pub(crate) fn child_position(parent: &Element, name: &str) -> Option<usize> {
    parent
        .children
        .iter()
        .position(|node| matches!(node, XMLNode::Element(el) if el.name == name))
}

/// The child element named `name`, appended if absent.
pub(crate) fn child_or_insert<'a>(parent: &'a mut Element, name: &str) -> &'a mut Element {
    let index = match child_position(parent, name) {
        Some(index) => index,
        None => {
            parent.children.push(XMLNode::Element(Element::new(name)));
            parent.children.len() - 1
        }
    };
    match &mut parent.children[index] {
        XMLNode::Element(el) => el,
        _ => unreachable!("child_position only matches elements"),
    }
}

/// Build an element with attributes in the given order.
pub(crate) fn element(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut el = Element::new(name);
    for (key, value) in attributes {
        el.attributes.insert((*key).to_string(), (*value).to_string());
    }
    el
}

/// Apply `f` to every descendant element named `name`, depth first.
pub(crate) fn for_each_descendant_mut(
    parent: &mut Element,
    name: &str,
    f: &mut dyn FnMut(&mut Element),
) {
    for node in parent.children.iter_mut() {
        if let XMLNode::Element(el) = node {
            if el.name == name {
                f(el);
            }
            for_each_descendant_mut(el, name, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<host name="master" xmlns="urn:jboss:domain:1.2">
    <management>
        <security-realms/>
    </management>
    <interfaces/>
</host>"#;

    #[test]
    fn parse_reads_root_name() {
        let doc = TopologyDocument::parse(HOST).unwrap();
        assert_eq!(doc.root().name, "host");
        assert_eq!(doc.root_name(), Some("master"));
    }

    #[test]
    fn layout_whitespace_is_dropped() {
        let doc = TopologyDocument::parse(HOST).unwrap();
        assert!(
            doc.root()
                .children
                .iter()
                .all(|node| matches!(node, XMLNode::Element(_)))
        );
        assert_eq!(doc.root().children.len(), 2);
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = TopologyDocument::parse("<host><servers></host>").unwrap_err();
        assert!(matches!(err, TopologyError::Parse(_)));
    }

    #[test]
    fn save_replaces_file_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.xml");
        std::fs::write(&path, HOST).unwrap();

        let mut doc = TopologyDocument::load(&path).unwrap();
        child_or_insert(doc.root_mut(), "servers");
        doc.save(&path).unwrap();

        let reloaded = TopologyDocument::load(&path).unwrap();
        assert!(child_position(reloaded.root(), "servers").is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn child_or_insert_reuses_existing() {
        let mut doc = TopologyDocument::parse(HOST).unwrap();
        child_or_insert(doc.root_mut(), "management");
        assert_eq!(children_named(doc.root(), "management").count(), 1);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = TopologyDocument::load(Path::new("/nonexistent/host.xml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/host.xml"));
    }
}
