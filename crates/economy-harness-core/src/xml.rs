//! Minimal XML element tree.
//!
//! Documents are read with `quick-xml` into [`XmlNode`]s: tag, attributes in
//! document order, trimmed text, and child elements. Comments, processing
//! instructions, and the declaration are discarded. Writing goes back
//! through `quick_xml::Writer` with a fixed indentation width.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::Error;

/// Declaration written ahead of every generated document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn descendants(&self) -> Vec<&XmlNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}

fn start_node(e: &BytesStart<'_>) -> Result<XmlNode, Error> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = XmlNode::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::malformed(format!("bad attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::malformed(format!("bad attribute value: {}", err)))?;
        node.attrs.push((key, value.into_owned()));
    }
    Ok(node)
}

fn append_text(node: &mut XmlNode, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match &mut node.text {
        Some(existing) => existing.push_str(text),
        None => node.text = Some(text.to_string()),
    }
}

/// Parse a whole document and return its root element.
pub fn parse_document(xml: &str) -> Result<XmlNode, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::malformed(format!(
                "XML error at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;
        match event {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::malformed(format!("bad text: {}", e)))?;
                    append_text(current, &text);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    append_text(current, &text);
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::malformed("unexpected closing tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::malformed(format!(
            "unclosed element <{}>",
            stack.last().map(|n| n.tag.as_str()).unwrap_or_default()
        )));
    }
    root.ok_or_else(|| Error::malformed("document has no root element"))
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(Error::malformed(format!(
            "multiple root elements (second is <{}>)",
            node.tag
        ))),
    }
}

fn write_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Io(std::io::Error::other(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), Error> {
    let mut start = BytesStart::new(node.tag.as_str());
    for (k, v) in &node.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if node.text.is_none() && node.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    if let Some(text) = &node.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_err)?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
        .map_err(write_err)?;
    Ok(())
}

/// Serialize an element tree with `indent` spaces per level. No
/// declaration and no trailing newline.
pub fn write_tree(node: &XmlNode, indent: usize) -> Result<String, Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
    write_node(&mut writer, node)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::malformed(format!("generated XML is not UTF-8: {}", e)))
}
