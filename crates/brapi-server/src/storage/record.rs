//! Backend record model
//!
//! Records are opaque to the mapping engine apart from the accessors defined
//! here: field values, referenced identifiers, the record identifier and a
//! plain-data rendering used by custom value expressions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Pseudo field name addressing the record identifier
pub const ID_FIELD: &str = "id";

/// Storage schema reference for one datatype mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTarget {
    /// Backend record kind (entity type)
    #[serde(default)]
    pub kind: String,
    /// Optional bundle / subtype within the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    /// Reference fields of this kind, mapped to the kind they point at
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, String>,
}

impl ContentTarget {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            bundle: None,
            references: BTreeMap::new(),
        }
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_reference(mut self, field: impl Into<String>, kind: impl Into<String>) -> Self {
        self.references.insert(field.into(), kind.into());
        self
    }

    /// Kind referenced by `field`, when it is a reference field
    pub fn reference_kind(&self, field: &str) -> Option<&str> {
        self.references.get(field).map(String::as_str)
    }
}

/// Stored value of one backend field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldData {
    /// Identifiers of records of `target_kind`
    References { target_kind: String, ids: Vec<String> },
    /// Plain (possibly multi-valued) values
    Values(Vec<Value>),
}

impl FieldData {
    pub fn single(value: impl Into<Value>) -> Self {
        FieldData::Values(vec![value.into()])
    }

    pub fn references(target_kind: impl Into<String>, ids: Vec<String>) -> Self {
        FieldData::References {
            target_kind: target_kind.into(),
            ids,
        }
    }

    /// Values of the field, references rendered as their identifiers
    pub fn values(&self) -> Vec<Value> {
        match self {
            FieldData::Values(values) => values.clone(),
            FieldData::References { ids, .. } => {
                ids.iter().map(|id| Value::String(id.clone())).collect()
            },
        }
    }
}

/// A backend entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldData>,
}

impl Record {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            bundle: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, data: FieldData) -> Self {
        self.fields.insert(name.into(), data);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.fields.get(name)
    }

    /// Values of `name`; the `id` pseudo field yields the identifier
    pub fn values(&self, name: &str) -> Option<Vec<Value>> {
        if name == ID_FIELD {
            return Some(vec![Value::String(self.id.clone())]);
        }
        self.fields.get(name).map(FieldData::values)
    }

    /// Identifiers referenced through `name`, with the referenced kind
    pub fn references(&self, name: &str) -> Option<(&str, &[String])> {
        match self.fields.get(name)? {
            FieldData::References { target_kind, ids } => Some((target_kind.as_str(), ids)),
            FieldData::Values(_) => None,
        }
    }

    /// Plain-data rendering: every field becomes a list of items, values as
    /// `{"value": v}` and references as `{"target_id": id}`.
    pub fn to_plain_data(&self) -> Value {
        let mut out = Map::new();
        out.insert(ID_FIELD.to_string(), json!([{ "value": self.id }]));
        for (name, data) in &self.fields {
            let items: Vec<Value> = match data {
                FieldData::Values(values) => {
                    values.iter().map(|value| json!({ "value": value })).collect()
                },
                FieldData::References { ids, .. } => {
                    ids.iter().map(|id| json!({ "target_id": id })).collect()
                },
            };
            out.insert(name.clone(), Value::Array(items));
        }
        Value::Object(out)
    }

    /// True when every filter matches at least one value of its field
    pub fn matches(&self, filters: &FilterSet) -> bool {
        filters.iter().all(|(field, filter)| {
            let Some(values) = self.values(field) else {
                return false;
            };
            let wanted = filter.candidates();
            values.iter().any(|value| wanted.contains(&scalar_text(value)))
        })
    }
}

/// Filter operand: a single value or an IN-list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<Value>),
    One(Value),
}

impl FilterValue {
    pub fn one(value: impl Into<Value>) -> Self {
        FilterValue::One(value.into())
    }

    pub fn many<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FilterValue::Many(values.into_iter().map(Into::into).collect())
    }

    /// Build from a JSON value, lists becoming IN-lists
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => FilterValue::Many(items),
            other => FilterValue::One(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Many(items) => items.iter().all(is_blank),
            FilterValue::One(value) => is_blank(value),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FilterValue::Many(_))
    }

    /// Comparable text forms of the operand values
    pub fn candidates(&self) -> Vec<String> {
        match self {
            FilterValue::Many(items) => items.iter().map(scalar_text).collect(),
            FilterValue::One(value) => vec![scalar_text(value)],
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Many(items) => Value::Array(items.clone()),
            FilterValue::One(value) => value.clone(),
        }
    }
}

/// Field name -> operand; every entry must match
pub type FilterSet = BTreeMap<String, FilterValue>;

/// Text used to compare scalars across JSON types (`7` equals `"7"`)
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
