//! Nested value model for one extracted record.
//!
//! A [`Shape`] maps field names to [`FieldValue`]s and remembers the order in
//! which fields first appeared. Equality ignores that order: two shapes are
//! equal when they hold the same keys with equal values.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A single field value. The four cases are the only shapes the extractor
/// produces and the store can persist.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Attributed(AttributedValue),
    /// Repeated occurrences of the same tag, in document order.
    List(Vec<FieldValue>),
}

/// A child element that carried attributes, or a nested child object.
///
/// `children` is only populated for child elements that had sub-elements of
/// their own; in that case `text` is always `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributedValue {
    pub text: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub children: Shape,
}

impl AttributedValue {
    pub fn new(text: Option<String>, attrs: BTreeMap<String, String>) -> Self {
        Self {
            text,
            attrs,
            children: Shape::new(),
        }
    }

    /// An attribute-only value carrying a single `name` attribute, the form
    /// used for vocabulary references like `<category name="food"/>`.
    pub fn named(name: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), name.to_string());
        Self::new(None, attrs)
    }
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Text content, if this value carries any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Attributed(a) => a.text.as_deref(),
            FieldValue::List(items) => items.first().and_then(|v| v.as_text()),
            FieldValue::Null => None,
        }
    }

    /// Iterate the occurrences of this value: list items, or the value
    /// itself for anything else.
    pub fn occurrences(&self) -> Vec<&FieldValue> {
        match self {
            FieldValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Canonical form used for comparisons: single-element lists collapse to
    /// their element, attributed values without attributes or children
    /// collapse to text (or null), recursively.
    pub fn normalized(&self) -> FieldValue {
        match self {
            FieldValue::List(items) if items.len() == 1 => items[0].normalized(),
            FieldValue::List(items) => {
                FieldValue::List(items.iter().map(FieldValue::normalized).collect())
            }
            FieldValue::Attributed(a) if a.attrs.is_empty() && a.children.is_empty() => {
                match &a.text {
                    Some(t) => FieldValue::Text(t.clone()),
                    None => FieldValue::Null,
                }
            }
            FieldValue::Attributed(a) => FieldValue::Attributed(AttributedValue {
                text: a.text.clone(),
                attrs: a.attrs.clone(),
                children: a.children.normalized(),
            }),
            other => other.clone(),
        }
    }

    /// JSON rendering used by `econ get --json` and by sidecar storage of
    /// nested children.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FieldValue::Attributed(a) => {
                let mut obj = Map::new();
                if let Some(text) = &a.text {
                    obj.insert("#text".to_string(), Value::String(text.clone()));
                }
                if !a.attrs.is_empty() {
                    let attrs: Map<String, Value> = a
                        .attrs
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect();
                    obj.insert("#attrs".to_string(), Value::Object(attrs));
                }
                if !a.children.is_empty() {
                    obj.insert("#children".to_string(), a.children.to_json());
                }
                Value::Object(obj)
            }
        }
    }

    /// Inverse of [`FieldValue::to_json`]. Numbers and booleans become text.
    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::Null => FieldValue::Null,
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            Value::Number(n) => FieldValue::Text(n.to_string()),
            Value::Array(items) if items.is_empty() => FieldValue::Null,
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(obj) => {
                let text = obj.get("#text").and_then(|v| v.as_str()).map(str::to_string);
                let attrs = obj
                    .get("#attrs")
                    .and_then(|v| v.as_object())
                    .map(json_string_map)
                    .unwrap_or_default();
                let children = obj
                    .get("#children")
                    .map(Shape::from_json)
                    .unwrap_or_default();
                FieldValue::Attributed(AttributedValue {
                    text,
                    attrs,
                    children,
                })
            }
        }
    }
}

pub(crate) fn json_string_map(obj: &Map<String, Value>) -> BTreeMap<String, String> {
    obj.iter()
        .filter(|(k, _)| !k.starts_with('#'))
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

/// Insertion-ordered map of field name → value.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    entries: Vec<(String, FieldValue)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` to `value`, keeping the original position if it exists.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Add another occurrence of `key`. The first occurrence is stored bare;
    /// the second turns the field into a [`FieldValue::List`].
    pub fn push_repeat(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, FieldValue::List(items))) => items.push(value),
            Some((_, slot)) => {
                let first = std::mem::replace(slot, FieldValue::Null);
                *slot = FieldValue::List(vec![first, value]);
            }
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Apply [`FieldValue::normalized`] to every value.
    pub fn normalized(&self) -> Shape {
        Shape {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        let obj: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(obj)
    }

    pub fn from_json(value: &Value) -> Shape {
        let mut shape = Shape::new();
        if let Some(obj) = value.as_object() {
            for (k, v) in obj {
                shape.insert(k.clone(), FieldValue::from_json(v));
            }
        }
        shape
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl FromIterator<(String, FieldValue)> for Shape {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut shape = Shape::new();
        for (k, v) in iter {
            shape.insert(k, v);
        }
        shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_repeat_builds_lists_in_order() {
        let mut shape = Shape::new();
        shape.push_repeat("usage", FieldValue::text("Coast"));
        assert_eq!(shape.get("usage"), Some(&FieldValue::text("Coast")));
        shape.push_repeat("usage", FieldValue::text("Village"));
        shape.push_repeat("usage", FieldValue::text("Town"));
        assert_eq!(
            shape.get("usage"),
            Some(&FieldValue::List(vec![
                FieldValue::text("Coast"),
                FieldValue::text("Village"),
                FieldValue::text("Town"),
            ]))
        );
    }

    #[test]
    fn equality_ignores_key_order() {
        let a: Shape = vec![
            ("nominal".to_string(), FieldValue::text("50")),
            ("min".to_string(), FieldValue::text("10")),
        ]
        .into_iter()
        .collect();
        let b: Shape = vec![
            ("min".to_string(), FieldValue::text("10")),
            ("nominal".to_string(), FieldValue::text("50")),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn normalized_collapses_single_lists_and_bare_attributed() {
        let v = FieldValue::List(vec![FieldValue::Attributed(AttributedValue::new(
            Some("x".to_string()),
            BTreeMap::new(),
        ))]);
        assert_eq!(v.normalized(), FieldValue::text("x"));
    }

    #[test]
    fn json_round_trip_keeps_child_order() {
        let mut children = Shape::new();
        children.insert("zone", FieldValue::text("north"));
        children.insert("item", FieldValue::text("Ammo"));
        children.insert("amount", FieldValue::text("3"));
        let back = Shape::from_json(&children.to_json());
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["zone", "item", "amount"]);
    }

    #[test]
    fn json_round_trip_keeps_nested_children() {
        let mut children = Shape::new();
        children.insert("item", FieldValue::text("Ammo"));
        children.push_repeat("slot", FieldValue::Attributed(AttributedValue::named("a")));
        children.push_repeat("slot", FieldValue::Attributed(AttributedValue::named("b")));
        let mut attrs = BTreeMap::new();
        attrs.insert("chance".to_string(), "0.5".to_string());
        let value = FieldValue::Attributed(AttributedValue {
            text: None,
            attrs,
            children,
        });
        assert_eq!(FieldValue::from_json(&value.to_json()), value);
    }
}
