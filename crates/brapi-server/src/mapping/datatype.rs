//! Datatype mappings: how one BrAPI datatype maps onto backend records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{inflector, MappingId};
use crate::storage::ContentTarget;

/// Custom expressions that read exactly one backend field and can be
/// inverted on write
static SIMPLE_CUSTOM: LazyLock<Result<regex::Regex, regex::Error>> = LazyLock::new(|| {
    regex::Regex::new(r"^\$\.([A-Za-z_][A-Za-z0-9_]*)\[(?:0|\*)\]\.(?:value|target_id)$")
});

/// Declared cardinality of a BrAPI field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// How the value of one BrAPI field is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// One-to-one backend field (plain value or reference)
    Direct { field: String },
    /// Constant
    Static { value: Value },
    /// Expression over the record's plain data
    Custom {
        expression: String,
        #[serde(default)]
        is_json: bool,
    },
    /// Related or embedded objects projected through another mapping
    SubMapping {
        source: SubMappingSource,
        target: SubMappingTarget,
    },
}

/// Records a sub-mapping projects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum SubMappingSource {
    /// The current record itself
    Record,
    /// Records referenced by a backend field
    Field { field: String },
    /// Identifiers produced by a custom expression
    Custom { expression: String },
}

/// Mapping used for each sub-mapped record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mapping", rename_all = "snake_case")]
pub enum SubMappingTarget {
    /// Top-level mapping of another datatype
    Datatype { datatype: String },
    /// `<current mapping>-<field>` nested mapping
    Nested,
}

/// Rule for one BrAPI field plus its projection flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(flatten)]
    pub rule: FieldRule,
    /// Internal linkage only, projected on explicit request
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// Filled from the schema when the catalog is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
}

impl FieldMapping {
    pub fn new(rule: FieldRule) -> Self {
        Self {
            rule,
            hidden: false,
            cardinality: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    /// Backend field written by this rule, if it can be inverted
    pub fn write_field(&self) -> Option<String> {
        match &self.rule {
            FieldRule::Direct { field } => Some(field.clone()),
            FieldRule::Custom { expression, .. } => SIMPLE_CUSTOM
                .as_ref()
                .ok()?
                .captures(expression)
                .map(|caps| caps[1].to_string()),
            FieldRule::Static { .. } | FieldRule::SubMapping { .. } => None,
        }
    }
}

/// Where a filter on a BrAPI field is evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRoute {
    /// Pushed to the store against this backend field
    Store(String),
    /// Evaluated on projected objects
    PostFilter,
    /// The mapping has no rule for the field
    Unsupported,
}

/// Mapping of one BrAPI datatype (or nested shape) onto a backend kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatatypeMapping {
    pub id: MappingId,
    /// Nested mappings without a target inherit their root's at load
    #[serde(default)]
    pub content_target: ContentTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_field: Option<String>,
    #[serde(default)]
    pub field_rules: BTreeMap<String, FieldMapping>,
}

impl DatatypeMapping {
    pub fn new(id: MappingId, content_target: ContentTarget) -> Self {
        Self {
            id,
            content_target,
            identifier_field: None,
            field_rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, field: impl Into<String>, mapping: FieldMapping) -> Self {
        self.field_rules.insert(field.into(), mapping);
        self
    }

    /// BrAPI field identifying records, `<datatype>DbId` unless configured
    pub fn identifier_field(&self) -> String {
        if let Some(ref field) = self.identifier_field {
            return field.clone();
        }
        let mut chars = self.id.datatype.chars();
        match chars.next() {
            Some(first) => format!("{}{}DbId", first.to_ascii_lowercase(), chars.as_str()),
            None => "dbId".to_string(),
        }
    }

    pub fn rule(&self, field: &str) -> Option<&FieldMapping> {
        self.field_rules.get(field)
    }

    /// Rule for `field`, trying its plural and singular forms on a miss
    pub fn find_rule(&self, field: &str) -> Option<(&str, &FieldMapping)> {
        [field.to_string(), inflector::plural(field), inflector::singular(field)]
            .iter()
            .find_map(|name| self.field_rules.get_key_value(name.as_str()))
            .map(|(name, rule)| (name.as_str(), rule))
    }

    /// Rules in projection order, hidden ones only when asked for
    pub fn visible_rules(&self, include_hidden: bool) -> impl Iterator<Item = (&String, &FieldMapping)> {
        self.field_rules
            .iter()
            .filter(move |(_, mapping)| include_hidden || !mapping.hidden)
    }

    pub fn filter_route(&self, field: &str) -> FilterRoute {
        match self.field_rules.get(field).map(|mapping| &mapping.rule) {
            Some(FieldRule::Direct { field }) => FilterRoute::Store(field.clone()),
            Some(_) => FilterRoute::PostFilter,
            None => FilterRoute::Unsupported,
        }
    }

    pub fn cardinality(&self, field: &str) -> Option<Cardinality> {
        self.field_rules.get(field).and_then(|mapping| mapping.cardinality)
    }

    /// Mapping id a sub-mapping rule on `field` projects through
    pub fn sub_mapping_id(&self, field: &str, target: &SubMappingTarget) -> MappingId {
        match target {
            SubMappingTarget::Datatype { datatype } => self.id.sibling(datatype),
            SubMappingTarget::Nested => self.id.nested(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn germplasm() -> DatatypeMapping {
        serde_json::from_value(json!({
            "id": "v2-2.1-Germplasm",
            "contentTarget": {"kind": "germplasm", "references": {"program": "program"}},
            "fieldRules": {
                "germplasmDbId": {"kind": "direct", "field": "id"},
                "germplasmName": {"kind": "direct", "field": "name"},
                "commonCropName": {"kind": "static", "value": "rice"},
                "accessionNumber": {"kind": "custom", "expression": "$.accession[0].value"},
                "donors": {
                    "kind": "sub_mapping",
                    "source": {"from": "record"},
                    "target": {"mapping": "nested"}
                },
                "programDbId": {"kind": "direct", "field": "program", "hidden": true}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_rules_deserialize_as_tagged_variants() {
        let mapping = germplasm();
        assert_eq!(
            mapping.rule("germplasmName").unwrap().rule,
            FieldRule::Direct { field: "name".to_string() }
        );
        assert!(matches!(
            mapping.rule("accessionNumber").unwrap().rule,
            FieldRule::Custom { is_json: false, .. }
        ));
        assert!(mapping.rule("programDbId").unwrap().hidden);
        assert_eq!(mapping.content_target.reference_kind("program"), Some("program"));
    }

    #[test]
    fn test_identifier_field_defaults_to_datatype_db_id() {
        let mut mapping = germplasm();
        assert_eq!(mapping.identifier_field(), "germplasmDbId");
        mapping.id = MappingId::new("v2", "2.1", "ObservationUnit");
        assert_eq!(mapping.identifier_field(), "observationUnitDbId");
        mapping.identifier_field = Some("unitId".to_string());
        assert_eq!(mapping.identifier_field(), "unitId");
    }

    #[test]
    fn test_filter_routes() {
        let mapping = germplasm();
        assert_eq!(mapping.filter_route("germplasmName"), FilterRoute::Store("name".to_string()));
        assert_eq!(mapping.filter_route("commonCropName"), FilterRoute::PostFilter);
        assert_eq!(mapping.filter_route("accessionNumber"), FilterRoute::PostFilter);
        assert_eq!(mapping.filter_route("seedSource"), FilterRoute::Unsupported);
    }

    #[test]
    fn test_find_rule_tries_inflections() {
        let mapping = germplasm();
        assert_eq!(mapping.find_rule("germplasmNames").map(|(name, _)| name), Some("germplasmName"));
        assert_eq!(mapping.find_rule("donor").map(|(name, _)| name), Some("donors"));
        assert!(mapping.find_rule("pedigree").is_none());
    }

    #[test]
    fn test_visible_rules_skip_hidden() {
        let mapping = germplasm();
        assert!(!mapping.visible_rules(false).any(|(name, _)| name == "programDbId"));
        assert!(mapping.visible_rules(true).any(|(name, _)| name == "programDbId"));
    }

    #[test]
    fn test_write_field_inverts_simple_custom_rules() {
        let mapping = germplasm();
        assert_eq!(mapping.rule("accessionNumber").unwrap().write_field(), Some("accession".to_string()));
        assert_eq!(mapping.rule("germplasmName").unwrap().write_field(), Some("name".to_string()));
        assert_eq!(mapping.rule("commonCropName").unwrap().write_field(), None);

        let joined = FieldMapping::new(FieldRule::Custom {
            expression: "$.a[0].value-$.b[0].value".to_string(),
            is_json: false,
        });
        assert_eq!(joined.write_field(), None);
    }

    #[test]
    fn test_sub_mapping_ids() {
        let mapping = germplasm();
        assert_eq!(
            mapping.sub_mapping_id("donors", &SubMappingTarget::Nested).to_string(),
            "v2-2.1-Germplasm-donors"
        );
        let study = SubMappingTarget::Datatype { datatype: "Study".to_string() };
        assert_eq!(mapping.sub_mapping_id("study", &study).to_string(), "v2-2.1-Study");
    }
}
