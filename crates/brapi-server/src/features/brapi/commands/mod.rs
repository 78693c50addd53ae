//! Write operations on BrAPI objects
//!
//! Writes go through the same datatype mapping as reads: identifiers are
//! looked up with the read pipeline and stored objects are re-projected
//! before they are returned. Input fields that cannot be mapped back to a
//! backend field are skipped with a warning.

pub mod create;
pub mod delete;
pub mod update;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::mapping::DatatypeMapping;
use crate::storage::{scalar_text, FieldData, ID_FIELD};

pub use create::{CreateObjectsCommand, CreateObjectsResponse};
pub use delete::{DeleteObjectsCommand, DeleteObjectsResponse};
pub use update::{UpdateObjectCommand, UpdateObjectResponse};

/// Backend fields of a BrAPI input object
#[derive(Debug, Default)]
pub(crate) struct WriteFields {
    /// Value written to the record identifier, if any
    pub id: Option<String>,
    pub fields: BTreeMap<String, FieldData>,
    pub warnings: Vec<String>,
}

fn values_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|item| !item.is_null()).cloned().collect(),
        other => vec![other.clone()],
    }
}

/// Invert the mapping's writable rules over `object`
pub(crate) fn write_fields(mapping: &DatatypeMapping, object: &Map<String, Value>) -> WriteFields {
    let mut out = WriteFields::default();
    for (name, value) in object {
        let Some((_, rule)) = mapping.find_rule(name) else {
            warn!(mapping = %mapping.id, field = %name, "Input field has no mapping rule");
            out.warnings.push(format!("Unmapped field: {name}"));
            continue;
        };
        let Some(backend) = rule.write_field() else {
            warn!(mapping = %mapping.id, field = %name, "Input field is not writable");
            out.warnings.push(format!("Read-only field: {name}"));
            continue;
        };

        if backend == ID_FIELD {
            out.id = values_of(value).first().map(scalar_text);
            continue;
        }

        let data = match mapping.content_target.reference_kind(&backend) {
            Some(kind) => FieldData::references(
                kind,
                values_of(value).iter().map(scalar_text).collect(),
            ),
            None => FieldData::Values(values_of(value)),
        };
        out.fields.insert(backend, data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, FieldRule, MappingId};
    use crate::storage::ContentTarget;
    use serde_json::json;

    fn mapping() -> DatatypeMapping {
        DatatypeMapping::new(
            "v2-2.1-Germplasm".parse::<MappingId>().unwrap(),
            ContentTarget::new("germplasm").with_reference("program", "program"),
        )
        .with_rule("germplasmDbId", FieldMapping::new(FieldRule::Direct { field: "id".into() }))
        .with_rule("germplasmName", FieldMapping::new(FieldRule::Direct { field: "name".into() }))
        .with_rule("programDbId", FieldMapping::new(FieldRule::Direct { field: "program".into() }))
        .with_rule(
            "commonCropName",
            FieldMapping::new(FieldRule::Custom {
                expression: "$.crop[0].value".into(),
                is_json: false,
            }),
        )
        .with_rule(
            "documentationURL",
            FieldMapping::new(FieldRule::Static { value: json!("https://brapi.org") }),
        )
    }

    #[test]
    fn test_write_fields() {
        let object = json!({
            "germplasmDbId": 7,
            "germplasmName": "IR64",
            "programDbId": "1",
            "commonCropName": "rice",
            "documentationURL": "https://example.org",
            "colour": "green"
        });
        let Value::Object(object) = object else { unreachable!() };
        let written = write_fields(&mapping(), &object);

        assert_eq!(written.id.as_deref(), Some("7"));
        assert_eq!(written.fields["name"], FieldData::single("IR64"));
        assert_eq!(written.fields["crop"], FieldData::single("rice"));
        assert_eq!(
            written.fields["program"],
            FieldData::references("program", vec!["1".to_string()])
        );
        assert_eq!(written.warnings.len(), 2);
        assert!(written.warnings.contains(&"Unmapped field: colour".to_string()));
    }
}
