//! Owned XML element tree built from quick-xml events.
//!
//! COLLADA documents are small enough to hold in memory and are read
//! out of order (libraries reference each other by ID), so the event
//! stream is folded into an element tree once and then read through
//! [`TreeNode`].

use assetgraph_core::{AssetError, Result, TreeNode};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Display;

/// One XML element: name, attributes in document order, child elements and
/// trimmed character content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Child elements named `tag`, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == tag)
    }
}

impl TreeNode for XmlNode {
    fn member(&self, key: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == key)
    }

    fn element(&self, index: usize) -> Option<&Self> {
        self.children.get(index)
    }

    fn len(&self) -> Option<usize> {
        Some(self.children.len())
    }

    // Every element can hold positional children and attributes.
    fn is_array(&self) -> bool {
        true
    }

    fn is_object(&self) -> bool {
        true
    }

    fn as_str(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn as_f64(&self) -> Option<f64> {
        self.text.parse().ok()
    }

    fn as_u64(&self) -> Option<u64> {
        self.text.parse().ok()
    }

    fn as_bool(&self) -> Option<bool> {
        match self.text.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn tag(&self) -> Option<&str> {
        Some(&self.name)
    }
}

fn xml_error(err: impl Display, position: impl Display) -> AssetError {
    AssetError::Xml(format!("{} at byte {}", err, position))
}

fn element(start: &BytesStart<'_>, position: u64) -> Result<XmlNode> {
    let mut node = XmlNode::new(String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(e, position))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| xml_error(e, position))?;
        node.attributes.insert(key, value.into_owned());
    }
    Ok(node)
}

fn close(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, mut node: XmlNode) -> Result<()> {
    let trimmed = node.text.trim();
    if trimmed.len() != node.text.len() {
        node.text = trimmed.to_string();
    }
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(AssetError::Xml("more than one root element".into())),
    }
    Ok(())
}

/// Parse a complete document and return its root element.
pub fn parse(data: &[u8]) -> Result<XmlNode> {
    let mut reader = Reader::from_reader(data);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => return Err(xml_error(err, reader.buffer_position())),
        };
        match event {
            Event::Start(start) => stack.push(element(&start, position)?),
            Event::Empty(start) => {
                let node = element(&start, position)?;
                close(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| xml_error("unbalanced end tag", position))?;
                close(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| xml_error(e, position))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(AssetError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| AssetError::Xml("document has no root element".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builds_element_tree() {
        let doc = br#"<?xml version="1.0"?>
            <COLLADA version="1.4.1">
              <asset><up_axis> Z_UP </up_axis></asset>
              <library_geometries>
                <geometry id="g0" name="Box"/>
                <geometry id="g1"/>
              </library_geometries>
            </COLLADA>"#;
        let root = parse(doc).unwrap();

        assert_eq!(root.tag(), Some("COLLADA"));
        assert_eq!(root.attribute("version"), Some("1.4.1"));
        assert_eq!(root.text, "");
        let up = root.member("asset").and_then(|a| a.member("up_axis")).unwrap();
        assert_eq!(up.text(), Some("Z_UP"));

        let lib = root.member("library_geometries").unwrap();
        assert_eq!(lib.len(), Some(2));
        assert_eq!(lib.element(0).unwrap().attribute("name"), Some("Box"));
        assert_eq!(lib.children_named("geometry").count(), 2);
        assert!(lib.element(2).is_none());
    }

    #[test]
    fn test_text_is_unescaped_and_joined() {
        let root = parse(b"<a>x &lt; y<![CDATA[ & z]]></a>").unwrap();
        assert_eq!(root.text, "x < y & z");
    }

    #[test]
    fn test_scalar_views() {
        let root = parse(b"<r><f>2.5</f><u>7</u><b>true</b><s>x</s></r>").unwrap();
        assert_eq!(root.find_number("f"), Some(2.5));
        assert_eq!(root.find_uint("u"), Some(7));
        assert_eq!(root.find_bool("b"), Some(true));
        assert_eq!(root.find_uint("s"), None);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse(b"<a><b></a>"), Err(AssetError::Xml(_))));
        assert!(matches!(parse(b"<a>"), Err(AssetError::Xml(_))));
        assert!(matches!(parse(b""), Err(AssetError::Xml(_))));
    }
}
