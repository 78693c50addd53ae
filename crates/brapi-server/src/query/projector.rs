//! Projection of backend records into BrAPI objects

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::warn;

use crate::mapping::{
    custom_value, Cardinality, DatatypeMapping, FieldMapping, FieldRule, MappingCatalog,
    MappingId, SubMappingSource,
};
use crate::storage::{scalar_text, FieldData, Record, RecordStore, ID_FIELD};

/// Builds BrAPI objects from records through the catalog's mappings
pub struct ObjectProjector<'a> {
    catalog: &'a MappingCatalog,
    store: &'a dyn RecordStore,
}

impl<'a> ObjectProjector<'a> {
    pub fn new(catalog: &'a MappingCatalog, store: &'a dyn RecordStore) -> Self {
        Self { catalog, store }
    }

    /// Project `record` through `mapping`
    ///
    /// Field-level failures degrade that field to null and are logged.
    pub async fn project(
        &self,
        record: &Record,
        mapping: &DatatypeMapping,
        include_hidden: bool,
    ) -> Value {
        self.project_on_path(record, mapping, include_hidden, vec![mapping.id.clone()])
            .await
    }

    /// `path` holds the mappings entered above this record, for cycle checks
    fn project_on_path<'b>(
        &'b self,
        record: &'b Record,
        mapping: &'b DatatypeMapping,
        include_hidden: bool,
        path: Vec<MappingId>,
    ) -> BoxFuture<'b, Value> {
        Box::pin(async move {
            let mut object = Map::new();
            if let Some(fields) = self
                .catalog
                .schema_for(&mapping.id)
                .and_then(|schema| schema.fields_for(&mapping.id))
            {
                for name in fields.keys() {
                    object.insert(name.clone(), Value::Null);
                }
            }

            let mut plain: Option<Value> = None;
            for (name, field) in mapping.visible_rules(include_hidden) {
                let value = match &field.rule {
                    FieldRule::Direct { field: backend } => {
                        self.direct_value(record, backend, field, mapping, name).await
                    },
                    FieldRule::Static { value } => value.clone(),
                    FieldRule::Custom { expression, is_json } => {
                        let data = plain.get_or_insert_with(|| record.to_plain_data());
                        custom_value::resolve(expression, data, *is_json)
                    },
                    FieldRule::SubMapping { source, target } => {
                        let target_id = mapping.sub_mapping_id(name, target);
                        if path.contains(&target_id) {
                            warn!(
                                mapping = %mapping.id,
                                field = %name,
                                target = %target_id,
                                "Mapping cycle, field left empty"
                            );
                            Value::Null
                        } else {
                            let data: &Value = plain.get_or_insert_with(|| record.to_plain_data());
                            self.sub_mapped_value(record, data, source, &target_id, &path, mapping, name)
                                .await
                        }
                    },
                };
                object.insert(name.clone(), coerce(value, field.cardinality));
            }
            Value::Object(object)
        })
    }

    async fn direct_value(
        &self,
        record: &Record,
        backend: &str,
        field: &FieldMapping,
        mapping: &DatatypeMapping,
        name: &str,
    ) -> Value {
        if backend == ID_FIELD {
            return Value::String(record.id.clone());
        }
        match record.field(backend) {
            None => Value::Null,
            Some(FieldData::References { target_kind, ids }) => {
                match self.store.load_many(target_kind, ids).await {
                    Ok(records) => Value::Array(records.iter().map(Record::to_plain_data).collect()),
                    Err(e) => {
                        warn!(mapping = %mapping.id, field = %name, error = %e, "Failed to load referenced records");
                        Value::Null
                    },
                }
            },
            Some(FieldData::Values(values)) => match (values.as_slice(), field.cardinality) {
                (_, Some(Cardinality::Many)) => Value::Array(values.clone()),
                ([single], _) => single.clone(),
                _ => Value::Array(values.clone()),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sub_mapped_value(
        &self,
        record: &Record,
        plain: &Value,
        source: &SubMappingSource,
        target_id: &MappingId,
        path: &[MappingId],
        mapping: &DatatypeMapping,
        name: &str,
    ) -> Value {
        let Some(target) = self.catalog.mapping(target_id) else {
            warn!(mapping = %mapping.id, field = %name, target = %target_id, "Unknown sub-mapping");
            return Value::Null;
        };

        let records = match source {
            SubMappingSource::Record => Ok(vec![record.clone()]),
            SubMappingSource::Field { field } => match record.field(field) {
                None => Ok(Vec::new()),
                Some(FieldData::References { target_kind, ids }) => {
                    self.store.load_many(target_kind, ids).await
                },
                Some(FieldData::Values(values)) => {
                    let ids: Vec<String> = values.iter().map(scalar_text).collect();
                    self.store.load_many(&target.content_target.kind, &ids).await
                },
            },
            SubMappingSource::Custom { expression } => {
                let ids = identifiers(custom_value::resolve(expression, plain, true));
                self.store.load_many(&target.content_target.kind, &ids).await
            },
        };

        let records = match records {
            Ok(records) => records,
            Err(e) => {
                warn!(mapping = %mapping.id, field = %name, error = %e, "Failed to load sub-mapped records");
                return Value::Null;
            },
        };

        let mut nested_path = path.to_vec();
        nested_path.push(target_id.clone());
        let mut projected = Vec::with_capacity(records.len());
        for related in &records {
            projected.push(
                self.project_on_path(related, target, false, nested_path.clone())
                    .await,
            );
        }
        Value::Array(projected)
    }
}

/// Identifier list from a resolved custom expression
fn identifiers(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(scalar_text).collect(),
        scalar => vec![scalar_text(&scalar)],
    }
}

/// Enforce the declared cardinality of a field value
///
/// Arrays declared scalar collapse to their first element (null when empty);
/// scalars declared array are wrapped, null becoming `[]`.
pub fn coerce(value: Value, cardinality: Option<Cardinality>) -> Value {
    match (cardinality, value) {
        (Some(Cardinality::Many), Value::Array(items)) => Value::Array(items),
        (Some(Cardinality::Many), Value::Null) => Value::Array(Vec::new()),
        (Some(Cardinality::Many), scalar) => Value::Array(vec![scalar]),
        (Some(Cardinality::One), Value::Array(items)) => {
            items.into_iter().next().unwrap_or(Value::Null)
        },
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContentTarget, MemoryRecordStore};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn catalog() -> MappingCatalog {
        let doc = json!({
            "schemas": [{
                "version": "v2",
                "release": "2.1",
                "datatypes": {
                    "Germplasm": {"fields": {
                        "germplasmDbId": {"type": "string"},
                        "germplasmName": {"type": "string"},
                        "synonyms": {"type": "array"},
                        "commonCropName": {"type": "string"},
                        "accessionNumber": {"type": "string"},
                        "seedSource": {"type": "string"},
                        "programDbId": {"type": "string"},
                        "program": {"type": "object", "dataType": "Program"},
                        "donors": {"type": "array", "fields": {"donorGermplasmName": {"type": "string"}}},
                        "parents": {"type": "array", "dataType": "Germplasm"}
                    }},
                    "Program": {"fields": {
                        "programDbId": {"type": "string"},
                        "programName": {"type": "string"}
                    }}
                },
                "calls": {}
            }],
            "mappings": [
                {
                    "id": "v2-2.1-Germplasm",
                    "contentTarget": {"kind": "germplasm", "references": {"program": "program"}},
                    "fieldRules": {
                        "germplasmDbId": {"kind": "direct", "field": "id"},
                        "germplasmName": {"kind": "direct", "field": "name"},
                        "synonyms": {"kind": "direct", "field": "synonyms"},
                        "commonCropName": {"kind": "static", "value": "rice"},
                        "accessionNumber": {"kind": "custom", "expression": "ACC-$.id[0].value"},
                        "programDbId": {"kind": "direct", "field": "program", "hidden": true},
                        "program": {
                            "kind": "sub_mapping",
                            "source": {"from": "field", "field": "program"},
                            "target": {"mapping": "datatype", "datatype": "Program"}
                        },
                        "donors": {
                            "kind": "sub_mapping",
                            "source": {"from": "record"},
                            "target": {"mapping": "nested"}
                        },
                        "parents": {
                            "kind": "sub_mapping",
                            "source": {"from": "field", "field": "parents"},
                            "target": {"mapping": "datatype", "datatype": "Germplasm"}
                        }
                    }
                },
                {
                    "id": "v2-2.1-Germplasm-donors",
                    "fieldRules": {"donorGermplasmName": {"kind": "direct", "field": "name"}}
                },
                {
                    "id": "v2-2.1-Program",
                    "contentTarget": {"kind": "program"},
                    "fieldRules": {
                        "programDbId": {"kind": "direct", "field": "id"},
                        "programName": {"kind": "direct", "field": "name"}
                    }
                }
            ]
        });
        let active = BTreeMap::from([("v2".to_string(), "2.1".to_string())]);
        MappingCatalog::from_json_str(&doc.to_string(), &active).unwrap()
    }

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::from_records([
            Record::new("program", "3").with_field("name", FieldData::single("Rice Breeding")),
            Record::new("germplasm", "7")
                .with_field("name", FieldData::single("IR64"))
                .with_field("synonyms", FieldData::single("IR-64"))
                .with_field("program", FieldData::references("program", vec!["3".to_string()]))
                .with_field("parents", FieldData::references("germplasm", vec!["8".to_string()])),
            Record::new("germplasm", "8").with_field("name", FieldData::single("IR8")),
        ])
    }

    async fn project(id: &str, include_hidden: bool) -> Value {
        let catalog = catalog();
        let store = store();
        let record = store
            .load_many("germplasm", &[id.to_string()])
            .await
            .unwrap()
            .remove(0);
        let mapping = catalog.datatype_mapping("v2", "Germplasm").unwrap();
        ObjectProjector::new(&catalog, &store)
            .project(&record, mapping, include_hidden)
            .await
    }

    #[tokio::test]
    async fn test_direct_static_and_custom_fields() {
        let object = project("7", false).await;
        assert_eq!(object["germplasmDbId"], json!("7"));
        assert_eq!(object["germplasmName"], json!("IR64"));
        assert_eq!(object["commonCropName"], json!("rice"));
        assert_eq!(object["accessionNumber"], json!("ACC-7"));
    }

    #[tokio::test]
    async fn test_cardinality_is_enforced() {
        let object = project("7", false).await;
        assert_eq!(object["synonyms"], json!(["IR-64"]));
        assert_eq!(object["donors"], json!([{"donorGermplasmName": "IR64"}]));
        assert_eq!(object["program"]["programName"], json!("Rice Breeding"));

        let bare = project("8", false).await;
        assert_eq!(bare["synonyms"], json!([]));
        assert_eq!(bare["program"], Value::Null);
        assert_eq!(bare["parents"], json!([]));
    }

    #[tokio::test]
    async fn test_hidden_fields_on_request_only() {
        let object = project("7", false).await;
        assert!(object.get("programDbId").map_or(true, Value::is_null));

        let hidden = project("7", true).await;
        assert_eq!(hidden["programDbId"], json!({"id": [{"value": "3"}], "name": [{"value": "Rice Breeding"}]}));
    }

    #[tokio::test]
    async fn test_unmapped_schema_fields_are_null() {
        let object = project("7", false).await;
        assert_eq!(object["seedSource"], Value::Null);
    }

    #[tokio::test]
    async fn test_self_reference_stops_at_cycle() {
        let object = project("7", false).await;
        assert_eq!(object["parents"], json!([]));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(json!("a"), Some(Cardinality::Many)), json!(["a"]));
        assert_eq!(coerce(Value::Null, Some(Cardinality::Many)), json!([]));
        assert_eq!(coerce(json!(["a", "b"]), Some(Cardinality::One)), json!("a"));
        assert_eq!(coerce(json!([]), Some(Cardinality::One)), Value::Null);
        assert_eq!(coerce(json!({"k": 1}), Some(Cardinality::One)), json!({"k": 1}));
        assert_eq!(coerce(json!(["a"]), None), json!(["a"]));
    }

    #[tokio::test]
    async fn test_single_direct_field() {
        let doc = json!({
            "schemas": [{"version": "v2", "release": "2.1", "datatypes": {}, "calls": {}}],
            "mappings": [{
                "id": "v2-2.1-Germplasm",
                "contentTarget": {"kind": "germplasm"},
                "fieldRules": {"germplasmName": {"kind": "direct", "field": "name"}}
            }]
        });
        let active = BTreeMap::from([("v2".to_string(), "2.1".to_string())]);
        let catalog = MappingCatalog::from_json_str(&doc.to_string(), &active).unwrap();
        let store = MemoryRecordStore::new();
        let record = store
            .create(&ContentTarget::new("germplasm"), None, BTreeMap::from([("name".to_string(), FieldData::single("IR64"))]))
            .await
            .unwrap();
        let mapping = catalog.datatype_mapping("v2", "Germplasm").unwrap();

        let object = ObjectProjector::new(&catalog, &store).project(&record, mapping, false).await;
        assert_eq!(object, json!({"germplasmName": "IR64"}));
    }
}
