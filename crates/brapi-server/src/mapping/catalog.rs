//! Mapping catalog: schemas, datatype mappings and call settings
//!
//! The catalog is a single JSON document:
//!
//! ```json
//! {
//!   "schemas":  [ { "version": "v2", "release": "2.1", "datatypes": {}, "calls": {} } ],
//!   "mappings": [ { "id": "v2-2.1-Germplasm", "contentTarget": {}, "fieldRules": {} } ],
//!   "settings": [ { "version": "v2", "release": "2.1", "calls": { "/germplasm": {} } } ]
//! }
//! ```
//!
//! It is validated once when loaded and then shared read-only.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    BrapiSchema, CallDefinition, CallSetting, Cardinality, DatatypeMapping, FieldRule,
    MappingId, SubMappingSource,
};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No schema for BrAPI {version} release {release}")]
    UnknownRelease { version: String, release: String },

    #[error("Mapping {0} is defined twice")]
    DuplicateMapping(MappingId),

    #[error("Mapping {0} has no content target")]
    MissingContentTarget(MappingId),

    #[error("Mapping {mapping} field '{field}' points at undefined mapping {target}")]
    MissingSubMapping {
        mapping: MappingId,
        field: String,
        target: MappingId,
    },

    #[error("Call {call} is not defined in BrAPI {version} release {release}")]
    UnknownCall {
        call: String,
        version: String,
        release: String,
    },

    #[error("Call {call} does not declare method {method}")]
    UndeclaredMethod { call: String, method: String },
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    schemas: Vec<BrapiSchema>,
    #[serde(default)]
    mappings: Vec<DatatypeMapping>,
    #[serde(default)]
    settings: Vec<ReleaseSettings>,
}

#[derive(Debug, Deserialize)]
struct ReleaseSettings {
    version: String,
    release: String,
    #[serde(default)]
    calls: BTreeMap<String, CallSetting>,
}

/// Everything known about one release
#[derive(Debug, Clone)]
struct ReleaseCatalog {
    schema: BrapiSchema,
    calls: BTreeMap<String, CallSetting>,
}

/// An enabled call of the active release
#[derive(Debug, Clone, Copy)]
pub struct ActiveCall<'a> {
    pub path: &'a str,
    pub definition: &'a CallDefinition,
    pub setting: &'a CallSetting,
}

/// Validated, read-only catalog
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    releases: BTreeMap<(String, String), ReleaseCatalog>,
    mappings: BTreeMap<MappingId, DatatypeMapping>,
    /// Version -> active release
    active: BTreeMap<String, String>,
}

impl MappingCatalog {
    /// Load and validate the catalog file
    pub fn load(
        path: impl AsRef<Path>,
        active: &BTreeMap<String, String>,
    ) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json_str(&content, active)?;
        info!(
            path = %path.as_ref().display(),
            mappings = catalog.mappings.len(),
            releases = catalog.releases.len(),
            "Loaded BrAPI catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_str(
        content: &str,
        active: &BTreeMap<String, String>,
    ) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(content)?;
        Self::from_document(document, active)
    }

    fn from_document(
        document: CatalogDocument,
        active: &BTreeMap<String, String>,
    ) -> Result<Self, CatalogError> {
        let mut releases = BTreeMap::new();
        for schema in document.schemas {
            let key = (schema.version.clone(), schema.release.clone());
            releases.insert(
                key,
                ReleaseCatalog {
                    schema,
                    calls: BTreeMap::new(),
                },
            );
        }

        for (version, release) in active {
            if !releases.contains_key(&(version.clone(), release.clone())) {
                return Err(CatalogError::UnknownRelease {
                    version: version.clone(),
                    release: release.clone(),
                });
            }
        }

        for settings in document.settings {
            let key = (settings.version.clone(), settings.release.clone());
            let entry = releases.get_mut(&key).ok_or_else(|| CatalogError::UnknownRelease {
                version: settings.version.clone(),
                release: settings.release.clone(),
            })?;
            for (call, setting) in &settings.calls {
                validate_call_setting(&entry.schema, call, setting)?;
            }
            entry.calls = settings.calls;
        }

        let mut mappings = BTreeMap::new();
        for mapping in document.mappings {
            if mappings.contains_key(&mapping.id) {
                return Err(CatalogError::DuplicateMapping(mapping.id));
            }
            mappings.insert(mapping.id.clone(), mapping);
        }

        inherit_content_targets(&mut mappings)?;
        validate_sub_mappings(&mappings)?;
        for mapping in mappings.values_mut() {
            let key = (mapping.id.version.clone(), mapping.id.release.clone());
            let release = releases.get(&key).ok_or_else(|| CatalogError::UnknownRelease {
                version: mapping.id.version.clone(),
                release: mapping.id.release.clone(),
            })?;
            fill_cardinality(&release.schema, mapping);
        }

        Ok(Self {
            releases,
            mappings,
            active: active.clone(),
        })
    }

    /// Active release of `version`
    pub fn release(&self, version: &str) -> Option<&str> {
        self.active.get(version).map(String::as_str)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Schema of the active release of `version`
    pub fn schema(&self, version: &str) -> Option<&BrapiSchema> {
        self.active_release(version).map(|release| &release.schema)
    }

    pub fn schema_for(&self, id: &MappingId) -> Option<&BrapiSchema> {
        self.releases
            .get(&(id.version.clone(), id.release.clone()))
            .map(|release| &release.schema)
    }

    pub fn mapping(&self, id: &MappingId) -> Option<&DatatypeMapping> {
        self.mappings.get(id)
    }

    /// Top-level mapping of `datatype` in the active release of `version`
    pub fn datatype_mapping(&self, version: &str, datatype: &str) -> Option<&DatatypeMapping> {
        let release = self.release(version)?;
        self.mappings.get(&MappingId::new(version, release, datatype))
    }

    pub fn call_setting(&self, version: &str, call: &str) -> Option<&CallSetting> {
        self.active_release(version)?.calls.get(call)
    }

    /// Enabled calls of the active release of `version`
    pub fn active_calls(&self, version: &str) -> Vec<ActiveCall<'_>> {
        let Some(release) = self.active_release(version) else {
            return Vec::new();
        };
        release
            .calls
            .iter()
            .filter_map(|(path, setting)| {
                release.schema.call(path).map(|definition| ActiveCall {
                    path: path.as_str(),
                    definition,
                    setting,
                })
            })
            .collect()
    }

    fn active_release(&self, version: &str) -> Option<&ReleaseCatalog> {
        let release = self.active.get(version)?;
        self.releases.get(&(version.to_string(), release.clone()))
    }
}

fn validate_call_setting(
    schema: &BrapiSchema,
    call: &str,
    setting: &CallSetting,
) -> Result<(), CatalogError> {
    let definition = schema.call(call).ok_or_else(|| CatalogError::UnknownCall {
        call: call.to_string(),
        version: schema.version.clone(),
        release: schema.release.clone(),
    })?;

    let declared = setting.methods.iter().chain(setting.roles_by_method.keys());
    for method in declared {
        if !definition.methods.contains_key(method) {
            return Err(CatalogError::UndeclaredMethod {
                call: call.to_string(),
                method: method.to_string(),
            });
        }
    }
    Ok(())
}

/// Nested mappings without a content target use their root's
fn inherit_content_targets(
    mappings: &mut BTreeMap<MappingId, DatatypeMapping>,
) -> Result<(), CatalogError> {
    let roots: BTreeMap<MappingId, _> = mappings
        .iter()
        .filter(|(id, _)| !id.is_nested())
        .map(|(id, mapping)| (id.clone(), mapping.content_target.clone()))
        .collect();

    for mapping in mappings.values_mut() {
        if !mapping.content_target.kind.is_empty() {
            continue;
        }
        match roots.get(&mapping.id.root()) {
            Some(target) if mapping.id.is_nested() && !target.kind.is_empty() => {
                mapping.content_target = target.clone();
            },
            _ => return Err(CatalogError::MissingContentTarget(mapping.id.clone())),
        }
    }
    Ok(())
}

fn validate_sub_mappings(
    mappings: &BTreeMap<MappingId, DatatypeMapping>,
) -> Result<(), CatalogError> {
    for mapping in mappings.values() {
        for (field, rule) in &mapping.field_rules {
            let FieldRule::SubMapping { ref target, ref source } = rule.rule else {
                continue;
            };
            let target_id = mapping.sub_mapping_id(field, target);
            if !mappings.contains_key(&target_id) {
                return Err(CatalogError::MissingSubMapping {
                    mapping: mapping.id.clone(),
                    field: field.clone(),
                    target: target_id,
                });
            }
            if let SubMappingSource::Field { field: ref backend } = source {
                if mapping.content_target.reference_kind(backend).is_none() {
                    warn!(
                        mapping = %mapping.id,
                        field = %field,
                        backend_field = %backend,
                        "Sub-mapping source is not a declared reference field"
                    );
                }
            }
        }
    }
    Ok(())
}

/// Copy array/scalar hints from the schema onto the rules
fn fill_cardinality(schema: &BrapiSchema, mapping: &mut DatatypeMapping) {
    let Some(fields) = schema.fields_for(&mapping.id) else {
        warn!(mapping = %mapping.id, "Mapping has no schema datatype");
        return;
    };

    for (name, rule) in mapping.field_rules.iter_mut() {
        if rule.cardinality.is_some() {
            continue;
        }
        match fields.get(name) {
            Some(definition) if definition.is_array() => rule.cardinality = Some(Cardinality::Many),
            Some(_) => rule.cardinality = Some(Cardinality::One),
            None => warn!(mapping = %mapping.id, field = %name, "Mapped field is not in the schema"),
        }
    }

    for name in fields.keys() {
        if !mapping.field_rules.contains_key(name) {
            tracing::debug!(mapping = %mapping.id, field = %name, "Schema field has no mapping rule");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active() -> BTreeMap<String, String> {
        BTreeMap::from([("v2".to_string(), "2.1".to_string())])
    }

    fn document() -> serde_json::Value {
        json!({
            "schemas": [{
                "version": "v2",
                "release": "2.1",
                "datatypes": {
                    "Germplasm": {"fields": {
                        "germplasmDbId": {"type": "string"},
                        "synonyms": {"type": "array"},
                        "donors": {"type": "array", "fields": {"donorInstituteCode": {"type": "string"}}}
                    }}
                },
                "calls": {
                    "/germplasm": {"dataTypes": ["Germplasm"], "methods": {"GET": {}, "POST": {}}}
                }
            }],
            "mappings": [
                {
                    "id": "v2-2.1-Germplasm",
                    "contentTarget": {"kind": "germplasm"},
                    "fieldRules": {
                        "germplasmDbId": {"kind": "direct", "field": "id"},
                        "synonyms": {"kind": "direct", "field": "synonyms"},
                        "donors": {"kind": "sub_mapping", "source": {"from": "record"}, "target": {"mapping": "nested"}}
                    }
                },
                {
                    "id": "v2-2.1-Germplasm-donors",
                    "fieldRules": {"donorInstituteCode": {"kind": "direct", "field": "donor_code"}}
                }
            ],
            "settings": [{
                "version": "v2",
                "release": "2.1",
                "calls": {"/germplasm": {"methods": ["GET", "POST"]}}
            }]
        })
    }

    fn load(document: serde_json::Value) -> Result<MappingCatalog, CatalogError> {
        MappingCatalog::from_json_str(&document.to_string(), &active())
    }

    #[test]
    fn test_load_fills_cardinality_and_targets() {
        let catalog = load(document()).unwrap();
        let germplasm = catalog.datatype_mapping("v2", "Germplasm").unwrap();
        assert_eq!(germplasm.cardinality("synonyms"), Some(Cardinality::Many));
        assert_eq!(germplasm.cardinality("germplasmDbId"), Some(Cardinality::One));

        let donors = catalog
            .mapping(&"v2-2.1-Germplasm-donors".parse().unwrap())
            .unwrap();
        assert_eq!(donors.content_target.kind, "germplasm");
        assert_eq!(donors.cardinality("donorInstituteCode"), Some(Cardinality::One));

        let calls = catalog.active_calls("v2");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/germplasm");
    }

    #[test]
    fn test_missing_sub_mapping_is_rejected() {
        let mut doc = document();
        doc["mappings"].as_array_mut().unwrap().pop();
        let err = load(doc).unwrap_err();
        assert!(matches!(err, CatalogError::MissingSubMapping { .. }));
    }

    #[test]
    fn test_undeclared_method_is_rejected() {
        let mut doc = document();
        doc["settings"][0]["calls"]["/germplasm"]["methods"] = json!(["GET", "DELETE"]);
        assert!(matches!(load(doc), Err(CatalogError::UndeclaredMethod { .. })));
    }

    #[test]
    fn test_unknown_call_is_rejected() {
        let mut doc = document();
        doc["settings"][0]["calls"]["/studies"] = json!({"methods": ["GET"]});
        assert!(matches!(load(doc), Err(CatalogError::UnknownCall { .. })));
    }

    #[test]
    fn test_inactive_release_without_schema_is_rejected() {
        let active = BTreeMap::from([("v1".to_string(), "1.3".to_string())]);
        let result = MappingCatalog::from_json_str(&document().to_string(), &active);
        assert!(matches!(result, Err(CatalogError::UnknownRelease { .. })));
    }

    #[test]
    fn test_bad_mapping_id_fails_parse() {
        let mut doc = document();
        doc["mappings"][0]["id"] = json!("germplasm");
        assert!(matches!(load(doc), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, document().to_string()).unwrap();
        let catalog = MappingCatalog::load(&path, &active()).unwrap();
        assert_eq!(catalog.release("v2"), Some("2.1"));
        assert!(catalog.schema("v2").is_some());
        assert!(catalog.schema("v1").is_none());
    }
}
