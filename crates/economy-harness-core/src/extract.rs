//! Structural extraction: XML element tree → one [`Shape`] per record.
//!
//! Shape rules, applied to every element whose tag equals the record tag:
//!
//! 1. The record's own attributes become top-level text fields.
//! 2. Each direct child without sub-elements becomes text, an
//!    attributed value, or nothing when it has neither text nor attributes.
//! 3. A direct child with sub-elements becomes an attributed value seeded
//!    with its attributes; each grandchild is converted with rule 2 and
//!    stored under its tag. Anything deeper is dropped.
//! 4. A tag repeating under the same parent becomes a list, in document
//!    order.
//!
//! Non-matching elements are searched recursively, so records nested at any
//! depth below the document root are found.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::shape::{AttributedValue, FieldValue, Shape};
use crate::xml::{parse_document, XmlNode};

/// Extract every record with tag `record_tag` below (or at) `root`.
pub fn extract_records(root: &XmlNode, record_tag: &str) -> Vec<Shape> {
    let mut out = Vec::new();
    collect(root, record_tag, &mut out);
    out
}

/// Parse `xml` and extract its records.
pub fn extract_str(xml: &str, record_tag: &str) -> Result<Vec<Shape>, Error> {
    let root = parse_document(xml)?;
    Ok(extract_records(&root, record_tag))
}

fn collect(node: &XmlNode, record_tag: &str, out: &mut Vec<Shape>) {
    if node.tag == record_tag {
        out.push(record_shape(node));
        return;
    }
    for child in &node.children {
        collect(child, record_tag, out);
    }
}

/// Build the shape of a single record element.
pub fn record_shape(node: &XmlNode) -> Shape {
    let mut shape = Shape::new();
    for (k, v) in &node.attrs {
        shape.push_repeat(k.clone(), FieldValue::Text(v.clone()));
    }
    for child in &node.children {
        let value = if child.children.is_empty() {
            leaf_value(child)
        } else {
            nested_value(child)
        };
        if let Some(value) = value {
            shape.push_repeat(child.tag.clone(), value);
        }
    }
    shape
}

fn attr_map(node: &XmlNode) -> BTreeMap<String, String> {
    node.attrs.iter().cloned().collect()
}

fn leaf_value(node: &XmlNode) -> Option<FieldValue> {
    let text = node
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let attrs = attr_map(node);
    match (text, attrs.is_empty()) {
        (None, true) => None,
        (Some(text), true) => Some(FieldValue::Text(text)),
        (text, false) => Some(FieldValue::Attributed(AttributedValue::new(text, attrs))),
    }
}

fn nested_value(node: &XmlNode) -> Option<FieldValue> {
    let mut children = Shape::new();
    for grandchild in &node.children {
        if !grandchild.children.is_empty() {
            tracing::debug!(
                parent = %node.tag,
                element = %grandchild.tag,
                dropped = grandchild.children.len(),
                "ignoring elements nested deeper than two levels"
            );
        }
        if let Some(value) = leaf_value(grandchild) {
            children.push_repeat(grandchild.tag.clone(), value);
        }
    }
    let attrs = attr_map(node);
    if attrs.is_empty() && children.is_empty() {
        return None;
    }
    Some(FieldValue::Attributed(AttributedValue {
        text: None,
        attrs,
        children,
    }))
}
