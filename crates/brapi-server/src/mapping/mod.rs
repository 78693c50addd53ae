//! Declarative BrAPI datatype mappings
//!
//! - [`identity`]: mapping identifiers (`v2-2.1-Germplasm-donors`)
//! - [`schema`]: versioned BrAPI schema and call settings
//! - [`datatype`]: field rules of one mapping
//! - [`catalog`]: the validated set of schemas, mappings and settings
//! - [`custom_value`]: JSONPath-based custom field expressions
//! - [`inflector`]: plural/singular field name matching

pub mod catalog;
pub mod custom_value;
pub mod datatype;
pub mod identity;
pub mod inflector;
pub mod schema;

pub use catalog::{ActiveCall, CatalogError, MappingCatalog};
pub use datatype::{
    Cardinality, DatatypeMapping, FieldMapping, FieldRule, FilterRoute, SubMappingSource,
    SubMappingTarget,
};
pub use identity::{InvalidMappingId, MappingId};
pub use schema::{
    BrapiSchema, CallDefinition, CallSetting, DatatypeDefinition, FieldDefinition, FieldType,
    Method, MethodDefinition, ParameterDefinition, ParameterLocation,
};
