//! Decomposition of a [`Shape`] into storable parts and the inverse.
//!
//! A record is stored as:
//!
//! | Part | Source keys |
//! |------|-------------|
//! | record name | `name` |
//! | [`FieldRow`]s | every other non-reserved key |
//! | vocabulary references | `category`, `tag`, `usage`, `value` |
//! | flags | `flags` |
//!
//! A field occurring once is one row with `order = None`; a list becomes one
//! row per item with `order` counting from 0. Attributes of an occurrence
//! (and, for nested child objects, its children under [`CHILDREN_KEY`]) are
//! kept in a JSON sidecar. The element's text is the scalar value.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::shape::{json_string_map, AttributedValue, FieldValue, Shape};

/// Sidecar key holding a nested child object's children.
pub const CHILDREN_KEY: &str = "#children";

pub const NAME_KEY: &str = "name";
pub const FLAGS_KEY: &str = "flags";

/// The four controlled vocabularies a record can reference by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Vocabulary {
    Category,
    Tag,
    Usage,
    Value,
}

impl Vocabulary {
    pub const ALL: [Vocabulary; 4] = [
        Vocabulary::Category,
        Vocabulary::Tag,
        Vocabulary::Usage,
        Vocabulary::Value,
    ];

    /// Field key inside a record shape (and element tag in XML).
    pub fn key(self) -> &'static str {
        match self {
            Vocabulary::Category => "category",
            Vocabulary::Tag => "tag",
            Vocabulary::Usage => "usage",
            Vocabulary::Value => "value",
        }
    }

    /// Reference table name.
    pub fn table(self) -> &'static str {
        match self {
            Vocabulary::Category => "categories",
            Vocabulary::Tag => "tags",
            Vocabulary::Usage => "usageflags",
            Vocabulary::Value => "valueflags",
        }
    }

    /// Edge table linking records to terms.
    pub fn edge_table(self) -> &'static str {
        match self {
            Vocabulary::Category => "element_categories",
            Vocabulary::Tag => "element_tags",
            Vocabulary::Usage => "element_usageflags",
            Vocabulary::Value => "element_valueflags",
        }
    }

    /// Foreign-key column in [`Vocabulary::edge_table`].
    pub fn id_column(self) -> &'static str {
        match self {
            Vocabulary::Category => "category_id",
            Vocabulary::Tag => "tag_id",
            Vocabulary::Usage => "usageflag_id",
            Vocabulary::Value => "valueflag_id",
        }
    }

    /// Accepts the field key, the table name, or the common singular forms.
    pub fn parse(s: &str) -> Option<Vocabulary> {
        match s.to_ascii_lowercase().as_str() {
            "category" | "categories" => Some(Vocabulary::Category),
            "tag" | "tags" => Some(Vocabulary::Tag),
            "usage" | "usages" | "usageflag" | "usageflags" => Some(Vocabulary::Usage),
            "value" | "values" | "valueflag" | "valueflags" => Some(Vocabulary::Value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Keys that never become field rows.
pub fn is_reserved_key(key: &str) -> bool {
    key == NAME_KEY || key == FLAGS_KEY || Vocabulary::parse(key).is_some_and(|v| v.key() == key)
}

/// How `<flags>` attribute values map to stored booleans and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagPolicy {
    /// `"1"` is true, `"0"` is false; both are stored and exported.
    #[default]
    All,
    /// Only `"1"` flags are stored; exports list set flags only.
    SetOnly,
}

/// One stored occurrence of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub field_name: String,
    pub order: Option<i64>,
    pub value: Option<String>,
    /// JSON object of attributes, plus [`CHILDREN_KEY`] for nested children.
    pub sidecar: Option<String>,
}

/// Everything `save` needs to persist one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decomposed {
    pub name: Option<String>,
    pub fields: Vec<FieldRow>,
    pub classifications: BTreeMap<Vocabulary, Vec<String>>,
    pub flags: BTreeMap<String, bool>,
}

/// Name of a record: its `name` field's text (first occurrence if repeated).
pub fn record_name(shape: &Shape) -> Option<String> {
    shape
        .get(NAME_KEY)
        .and_then(|v| v.as_text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Record key: the name if present, else
/// `element_{type}_{source_folder}_{source_file_stem}`.
///
/// Nameless records of the same `type` in the same file share a key, so the
/// last one saved wins.
pub fn record_key(shape: &Shape, source_folder: &str, source_file: &str) -> String {
    if let Some(name) = record_name(shape) {
        return name;
    }
    let kind = shape
        .get("type")
        .and_then(|v| v.as_text())
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");
    let stem = Path::new(source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file.to_string());
    format!("element_{}_{}_{}", kind, source_folder, stem)
}

/// Split a shape into name, field rows, vocabulary references, and flags.
pub fn decompose(shape: &Shape, policy: FlagPolicy) -> Decomposed {
    let mut out = Decomposed {
        name: record_name(shape),
        ..Decomposed::default()
    };

    for (key, value) in shape.iter() {
        if key == NAME_KEY {
            continue;
        }
        if key == FLAGS_KEY {
            collect_flags(value, policy, &mut out.flags);
            continue;
        }
        if let Some(vocab) = Vocabulary::parse(key).filter(|v| v.key() == key) {
            let names = out.classifications.entry(vocab).or_default();
            for occurrence in value.occurrences() {
                if let Some(name) = reference_name(occurrence) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            continue;
        }
        match value {
            FieldValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    out.fields.push(field_row(key, Some(i as i64), item));
                }
            }
            other => out.fields.push(field_row(key, None, other)),
        }
    }

    out.classifications.retain(|_, names| !names.is_empty());
    out
}

fn reference_name(value: &FieldValue) -> Option<String> {
    let name = match value {
        FieldValue::Attributed(a) => a.attrs.get(NAME_KEY).cloned().or_else(|| a.text.clone()),
        FieldValue::Text(s) => Some(s.clone()),
        _ => None,
    }?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn collect_flags(value: &FieldValue, policy: FlagPolicy, flags: &mut BTreeMap<String, bool>) {
    for occurrence in value.occurrences() {
        let FieldValue::Attributed(a) = occurrence else {
            tracing::warn!(value = ?occurrence, "ignoring <flags> without attributes");
            continue;
        };
        for (flag, raw) in &a.attrs {
            match (raw.trim(), policy) {
                ("1", _) => {
                    flags.insert(flag.clone(), true);
                }
                ("0", FlagPolicy::All) => {
                    flags.insert(flag.clone(), false);
                }
                ("0", FlagPolicy::SetOnly) => {}
                (other, _) => {
                    tracing::warn!(flag = %flag, value = %other, "ignoring non-boolean flag value");
                }
            }
        }
    }
}

fn field_row(key: &str, order: Option<i64>, value: &FieldValue) -> FieldRow {
    let (text, sidecar) = match value {
        FieldValue::Null => (None, None),
        FieldValue::Text(s) => (Some(s.clone()), None),
        FieldValue::Attributed(a) => (a.text.clone(), sidecar_json(a)),
        // Lists inside lists do not occur in extracted shapes; store the
        // nested list as an opaque child object.
        FieldValue::List(_) => {
            let mut children = Shape::new();
            children.insert(key, value.clone());
            (None, sidecar_json(&AttributedValue {
                text: None,
                attrs: BTreeMap::new(),
                children,
            }))
        }
    };
    FieldRow {
        field_name: key.to_string(),
        order,
        value: text,
        sidecar,
    }
}

fn sidecar_json(a: &AttributedValue) -> Option<String> {
    if a.attrs.is_empty() && a.children.is_empty() {
        return None;
    }
    let mut obj: Map<String, Value> = a
        .attrs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    if !a.children.is_empty() {
        obj.insert(CHILDREN_KEY.to_string(), a.children.to_json());
    }
    Some(Value::Object(obj).to_string())
}

/// Convert one stored row back into a value.
pub fn row_value(row: &FieldRow) -> Result<FieldValue, Error> {
    let Some(sidecar) = &row.sidecar else {
        return Ok(match &row.value {
            Some(text) => FieldValue::Text(text.clone()),
            None => FieldValue::Null,
        });
    };
    let parsed: Value = serde_json::from_str(sidecar).map_err(|e| {
        Error::malformed(format!(
            "attributes of field '{}' are not valid JSON: {}",
            row.field_name, e
        ))
    })?;
    let obj = parsed.as_object().ok_or_else(|| {
        Error::malformed(format!(
            "attributes of field '{}' are not a JSON object",
            row.field_name
        ))
    })?;
    let children = obj.get(CHILDREN_KEY).map(Shape::from_json).unwrap_or_default();
    Ok(FieldValue::Attributed(AttributedValue {
        text: row.value.clone(),
        attrs: json_string_map(obj),
        children,
    }))
}

/// Rebuild a shape from stored parts.
///
/// Rows are grouped by field name in `(field_name, order)` order with unordered
/// rows first, so the result lists regular fields alphabetically, followed by
/// the vocabulary keys and `flags`.
pub fn compose(
    name: Option<&str>,
    fields: &[FieldRow],
    classifications: &BTreeMap<Vocabulary, Vec<String>>,
    flags: &BTreeMap<String, bool>,
) -> Result<Shape, Error> {
    let mut shape = Shape::new();
    if let Some(name) = name {
        shape.insert(NAME_KEY, FieldValue::text(name));
    }

    let mut rows: Vec<&FieldRow> = fields.iter().collect();
    rows.sort_by(|a, b| {
        a.field_name
            .cmp(&b.field_name)
            .then_with(|| a.order.unwrap_or(-1).cmp(&b.order.unwrap_or(-1)))
    });
    for row in rows {
        shape.push_repeat(row.field_name.clone(), row_value(row)?);
    }

    for vocab in Vocabulary::ALL {
        let Some(names) = classifications.get(&vocab).filter(|n| !n.is_empty()) else {
            continue;
        };
        let items = names
            .iter()
            .map(|n| FieldValue::Attributed(AttributedValue::named(n)))
            .collect();
        shape.insert(vocab.key(), FieldValue::List(items));
    }

    if !flags.is_empty() {
        let attrs = flags
            .iter()
            .map(|(k, v)| (k.clone(), if *v { "1" } else { "0" }.to_string()))
            .collect();
        shape.insert(FLAGS_KEY, FieldValue::Attributed(AttributedValue::new(None, attrs)));
    }

    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_str;

    fn apple() -> Shape {
        extract_str(
            r#"<types><type name="Apple">
                <nominal>50</nominal>
                <category name="food"/>
                <usage name="Coast"/>
                <usage name="Village"/>
                <flags count_in_map="1" crafted="0"/>
            </type></types>"#,
            "type",
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn scalar_field_becomes_unordered_row() {
        let parts = decompose(&apple(), FlagPolicy::All);
        assert_eq!(parts.name.as_deref(), Some("Apple"));
        assert_eq!(
            parts.fields,
            vec![FieldRow {
                field_name: "nominal".to_string(),
                order: None,
                value: Some("50".to_string()),
                sidecar: None,
            }]
        );
        assert_eq!(parts.classifications[&Vocabulary::Category], vec!["food"]);
        assert_eq!(
            parts.classifications[&Vocabulary::Usage],
            vec!["Coast", "Village"]
        );
    }

    #[test]
    fn flag_policy_controls_false_flags() {
        let all = decompose(&apple(), FlagPolicy::All);
        assert_eq!(all.flags.get("count_in_map"), Some(&true));
        assert_eq!(all.flags.get("crafted"), Some(&false));

        let set_only = decompose(&apple(), FlagPolicy::SetOnly);
        assert_eq!(set_only.flags.len(), 1);
        assert_eq!(set_only.flags.get("count_in_map"), Some(&true));
    }

    #[test]
    fn repeated_field_rows_are_ordered_from_zero() {
        let shape = extract_str(
            r#"<types><type name="X"><attachments>a</attachments><attachments unit="u">b</attachments></type></types>"#,
            "type",
        )
        .unwrap()
        .remove(0);
        let parts = decompose(&shape, FlagPolicy::All);
        assert_eq!(parts.fields.len(), 2);
        assert_eq!(parts.fields[0].order, Some(0));
        assert_eq!(parts.fields[1].order, Some(1));
        assert_eq!(parts.fields[1].value.as_deref(), Some("b"));
        assert_eq!(parts.fields[1].sidecar.as_deref(), Some(r#"{"unit":"u"}"#));
    }

    #[test]
    fn compose_inverts_decompose() {
        let shape = extract_str(
            r#"<types><type name="Crate">
                <lifetime>3600</lifetime>
                <cargo chance="0.5"><item name="Ammo"/><item name="Food"/></cargo>
                <attachments>a</attachments><attachments>b</attachments>
                <quantmin unit="pct">10</quantmin>
                <tag name="floor"/>
                <value name="Tier1"/><value name="Tier2"/>
                <flags deloot="1" crafted="0"/>
            </type></types>"#,
            "type",
        )
        .unwrap()
        .remove(0);
        let parts = decompose(&shape, FlagPolicy::All);
        let back = compose(
            parts.name.as_deref(),
            &parts.fields,
            &parts.classifications,
            &parts.flags,
        )
        .unwrap();
        assert_eq!(back.normalized(), shape.normalized());
    }

    #[test]
    fn nested_child_order_survives_storage() {
        let shape = extract_str(
            r#"<types><type name="Crate">
                <cargo chance="0.5"><zone>north</zone><item name="Ammo"/><amount>3</amount></cargo>
            </type></types>"#,
            "type",
        )
        .unwrap()
        .remove(0);
        let parts = decompose(&shape, FlagPolicy::All);
        let value = row_value(&parts.fields[0]).unwrap();
        let FieldValue::Attributed(cargo) = value else {
            panic!("expected attributed cargo, got {:?}", value);
        };
        assert_eq!(
            cargo.children.keys().collect::<Vec<_>>(),
            vec!["zone", "item", "amount"]
        );
    }

    #[test]
    fn nameless_record_key_is_synthesized() {
        let shape = extract_str(r#"<types><type type="event"/></types>"#, "type")
            .unwrap()
            .remove(0);
        assert_eq!(
            record_key(&shape, "db", "types.xml"),
            "element_event_db_types"
        );
        assert_eq!(
            record_key(&Shape::new(), "custom", "extra.xml"),
            "element_unknown_custom_extra"
        );
    }

    #[test]
    fn bad_sidecar_is_malformed_input() {
        let row = FieldRow {
            field_name: "cargo".to_string(),
            order: None,
            value: None,
            sidecar: Some("{not json".to_string()),
        };
        assert!(matches!(row_value(&row), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn reserved_keys() {
        for key in ["name", "flags", "category", "tag", "usage", "value"] {
            assert!(is_reserved_key(key), "{key}");
        }
        assert!(!is_reserved_key("nominal"));
        assert!(!is_reserved_key("categories"));
    }
}
