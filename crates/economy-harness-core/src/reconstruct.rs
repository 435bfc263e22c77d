//! Shape → XML element, and element list → file text.

use serde::Deserialize;

use crate::error::Error;
use crate::normalize::{record_name, FlagPolicy, Vocabulary, FLAGS_KEY, NAME_KEY};
use crate::shape::{FieldValue, Shape};
use crate::xml::{write_tree, XmlNode, XML_DECLARATION};

/// Where a record's name is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamePlacement {
    /// `<type name="X">`
    #[default]
    Attribute,
    /// `<type><name>X</name>...`
    Child,
}

/// Per-deployment output conventions. Never inferred from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conventions {
    pub name_placement: NamePlacement,
    pub flag_policy: FlagPolicy,
}

/// Build the XML element for one record.
///
/// Regular fields come first in shape order, then `category`, `tag`,
/// `usage`, `value`, and finally `flags`.
pub fn reconstruct(shape: &Shape, record_tag: &str, conventions: &Conventions) -> XmlNode {
    let mut node = XmlNode::new(record_tag);

    if let Some(name) = record_name(shape) {
        match conventions.name_placement {
            NamePlacement::Attribute => node.attrs.push((NAME_KEY.to_string(), name)),
            NamePlacement::Child => node.children.push(XmlNode::new(NAME_KEY).with_text(name)),
        }
    }

    for (key, value) in shape.iter() {
        if key == NAME_KEY || key == FLAGS_KEY || is_vocabulary_key(key) {
            continue;
        }
        node.children.extend(value_nodes(key, value));
    }

    for vocab in Vocabulary::ALL {
        if let Some(value) = shape.get(vocab.key()) {
            node.children.extend(value_nodes(vocab.key(), value));
        }
    }

    if let Some(flags) = shape.get(FLAGS_KEY).and_then(|v| flags_node(v, conventions.flag_policy)) {
        node.children.push(flags);
    }

    node
}

fn is_vocabulary_key(key: &str) -> bool {
    Vocabulary::ALL.iter().any(|v| v.key() == key)
}

fn value_nodes(tag: &str, value: &FieldValue) -> Vec<XmlNode> {
    match value {
        FieldValue::Null => Vec::new(),
        FieldValue::Text(text) => vec![XmlNode::new(tag).with_text(text.clone())],
        FieldValue::List(items) => items.iter().flat_map(|v| value_nodes(tag, v)).collect(),
        FieldValue::Attributed(a) => {
            let mut node = XmlNode::new(tag);
            node.attrs = a.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            node.text = a.text.clone();
            for (child_tag, child_value) in a.children.iter() {
                node.children.extend(value_nodes(child_tag, child_value));
            }
            vec![node]
        }
    }
}

fn flags_node(value: &FieldValue, policy: FlagPolicy) -> Option<XmlNode> {
    let mut node = XmlNode::new(FLAGS_KEY);
    for occurrence in value.occurrences() {
        let FieldValue::Attributed(a) = occurrence else {
            continue;
        };
        for (flag, raw) in &a.attrs {
            let set = raw.trim() == "1";
            if policy == FlagPolicy::SetOnly && !set {
                continue;
            }
            if node.attr(flag).is_none() {
                node.attrs.push((flag.clone(), if set { "1" } else { "0" }.to_string()));
            }
        }
    }
    if policy == FlagPolicy::SetOnly && node.attrs.is_empty() {
        return None;
    }
    node.attrs.sort();
    Some(node)
}

/// Serialize records into a complete file: declaration line, then the
/// container element holding every record, then a trailing newline.
pub fn write_document(container: &str, records: Vec<XmlNode>, indent: usize) -> Result<String, Error> {
    let mut root = XmlNode::new(container);
    root.children = records;
    let body = write_tree(&root, indent)?;
    Ok(format!("{}\n{}\n", XML_DECLARATION, body))
}
