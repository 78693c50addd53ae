//! Versioned BrAPI schema definitions and call settings
//!
//! A [`BrapiSchema`] describes one `(version, release)` of the standard: the
//! datatypes with their field types, and the calls with the methods and query
//! parameters they accept. It is loaded once and only ever read.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::MappingId;

/// Query parameters handled by the pagination layer rather than as filters
pub const RESERVED_PARAMETERS: &[&str] = &["page", "pageSize", "Authorization"];

/// HTTP method of a BrAPI call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("Unsupported method: {other}")),
        }
    }
}

impl TryFrom<&axum::http::Method> for Method {
    type Error = String;

    fn try_from(method: &axum::http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// JSON type of a BrAPI field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Datatype of the object(s) held by the field
    #[serde(default, rename = "dataType", skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    /// Inline object shape, for fields without a named datatype
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            datatype: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn is_array(&self) -> bool {
        self.field_type == FieldType::Array
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatatypeDefinition {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
}

/// Where a call parameter is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDefinition {
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

impl MethodDefinition {
    /// Declared query-string filters, pagination excluded
    pub fn query_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Query)
            .map(|p| p.name.as_str())
            .filter(|name| !RESERVED_PARAMETERS.contains(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallDefinition {
    #[serde(default, rename = "dataTypes")]
    pub datatypes: Vec<String>,
    #[serde(default)]
    pub methods: BTreeMap<Method, MethodDefinition>,
}

impl CallDefinition {
    /// Datatype returned by the call
    pub fn datatype(&self) -> Option<&str> {
        self.datatypes.first().map(String::as_str)
    }
}

/// One release of the BrAPI standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrapiSchema {
    pub version: String,
    pub release: String,
    #[serde(default)]
    pub datatypes: BTreeMap<String, DatatypeDefinition>,
    /// Calls keyed by path template, e.g. `/germplasm/{germplasmDbId}`
    #[serde(default)]
    pub calls: BTreeMap<String, CallDefinition>,
}

impl BrapiSchema {
    /// Fields declared for the mapping's datatype, descending into nested
    /// shapes for sub-field mappings
    pub fn fields_for(&self, id: &MappingId) -> Option<&BTreeMap<String, FieldDefinition>> {
        let mut fields = &self.datatypes.get(&id.datatype)?.fields;
        for subfield in &id.subfields {
            let field = fields.get(subfield)?;
            fields = match field.datatype {
                Some(ref datatype) if field.fields.is_empty() => {
                    &self.datatypes.get(datatype)?.fields
                },
                _ => &field.fields,
            };
        }
        Some(fields)
    }

    pub fn field(&self, id: &MappingId, name: &str) -> Option<&FieldDefinition> {
        self.fields_for(id)?.get(name)
    }

    pub fn call(&self, path: &str) -> Option<&CallDefinition> {
        self.calls.get(path)
    }
}

/// Per-call server settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSetting {
    /// Methods enabled on this server
    pub methods: BTreeSet<Method>,
    /// Explicit role requirements; methods absent here use the default policy
    #[serde(default)]
    pub roles_by_method: BTreeMap<Method, BTreeSet<String>>,
    /// Run searches through the deferred job protocol
    #[serde(default)]
    pub deferred: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> BrapiSchema {
        serde_json::from_value(json!({
            "version": "v2",
            "release": "2.1",
            "datatypes": {
                "Germplasm": {
                    "fields": {
                        "germplasmDbId": {"type": "string", "required": true},
                        "synonyms": {"type": "array"},
                        "donors": {
                            "type": "array",
                            "fields": {"donorAccessionNumber": {"type": "string"}}
                        },
                        "study": {"type": "object", "dataType": "Study"}
                    }
                },
                "Study": {"fields": {"studyName": {"type": "string"}}}
            },
            "calls": {
                "/germplasm": {
                    "dataTypes": ["Germplasm"],
                    "methods": {
                        "GET": {"parameters": [
                            {"name": "germplasmName", "in": "query"},
                            {"name": "page", "in": "query"},
                            {"name": "Authorization", "in": "header"}
                        ]},
                        "POST": {}
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_fields_for_nested_mappings() {
        let schema = schema();
        let root = MappingId::new("v2", "2.1", "Germplasm");
        assert!(schema.field(&root, "synonyms").unwrap().is_array());

        let donors = schema.fields_for(&root.nested("donors")).unwrap();
        assert!(donors.contains_key("donorAccessionNumber"));

        let study = schema.fields_for(&root.nested("study")).unwrap();
        assert!(study.contains_key("studyName"));

        assert!(schema.fields_for(&root.nested("missing")).is_none());
    }

    #[test]
    fn test_query_parameters_skip_reserved() {
        let schema = schema();
        let call = schema.call("/germplasm").unwrap();
        let params: Vec<&str> = call.methods[&Method::Get].query_parameters().collect();
        assert_eq!(params, vec!["germplasmName"]);
        assert_eq!(call.datatype(), Some("Germplasm"));
    }

    #[test]
    fn test_call_setting_deserializes() {
        let setting: CallSetting = serde_json::from_value(json!({
            "methods": ["GET", "POST"],
            "rolesByMethod": {"POST": ["breeder"]},
            "deferred": true
        }))
        .unwrap();
        assert!(setting.methods.contains(&Method::Post));
        assert!(setting.roles_by_method[&Method::Post].contains("breeder"));
        assert!(setting.deferred);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert!("PATCH".parse::<Method>().is_err());
        assert_eq!(Method::try_from(&axum::http::Method::DELETE), Ok(Method::Delete));
    }
}
