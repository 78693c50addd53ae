//! Translation of BrAPI request parameters into store and post filters
//!
//! Parameters come from three places: path parameters (single-record calls),
//! the query string, and for search calls the JSON body. Every parameter is
//! resolved against the datatype's schema fields and routed by the mapping:
//! direct fields become store filters, anything computed becomes a post-filter
//! on the projected objects. Parameters nobody understands produce warnings.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{PageRequest, PaginationSettings};
use crate::mapping::{
    inflector, DatatypeMapping, FieldDefinition, FieldRule, FilterRoute, MappingCatalog,
    MappingId, MethodDefinition, SubMappingSource,
};
use crate::storage::{FilterSet, FilterValue, ID_FIELD};

/// Identifier filter that can never match
pub const NO_MATCH: &str = "-1";

/// Backend identifiers of records matching BrAPI-level filters
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Identifiers of `mapping` records matching every entry of `filters`
    /// (BrAPI field name -> operand)
    async fn lookup_ids(&self, mapping: &MappingId, filters: Map<String, Value>) -> Vec<String>;
}

/// Request parameters to translate
#[derive(Debug, Clone, Copy)]
pub struct TranslateInput<'a> {
    pub path_params: &'a BTreeMap<String, String>,
    pub query: &'a BTreeMap<String, String>,
    /// JSON body of a search call
    pub body: Option<&'a Map<String, Value>>,
    /// Declared definition of the call's method
    pub method: Option<&'a MethodDefinition>,
    /// Apply pagination (off for reference resolution)
    pub paginate: bool,
}

/// Filters split by where they are evaluated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedQuery {
    /// Backend field -> operand
    pub pushable: FilterSet,
    /// BrAPI field -> operand, applied to projected objects
    pub post: FilterSet,
    pub warnings: Vec<String>,
    pub page: PageRequest,
    /// Request addresses one record through path parameters
    pub single_record: bool,
}

pub struct QueryTranslator<'a> {
    catalog: &'a MappingCatalog,
    lookup: &'a dyn ReferenceLookup,
    pagination: PaginationSettings,
}

/// Parameters consumed so far, for unsupported-filter warnings
#[derive(Default)]
struct Consumed {
    query: BTreeSet<String>,
    body: BTreeSet<String>,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(
        catalog: &'a MappingCatalog,
        lookup: &'a dyn ReferenceLookup,
        pagination: PaginationSettings,
    ) -> Self {
        Self {
            catalog,
            lookup,
            pagination,
        }
    }

    #[tracing::instrument(skip(self, input, mapping), fields(mapping = %mapping.id))]
    pub async fn translate(
        &self,
        input: &TranslateInput<'_>,
        mapping: &DatatypeMapping,
    ) -> TranslatedQuery {
        let mut out = TranslatedQuery::default();

        if !input.path_params.is_empty() {
            out.single_record = true;
            out.page = PageRequest::new(0, Some(1));
            for (name, value) in input.path_params {
                if let FilterRoute::Unsupported = mapping.filter_route(name) {
                    // An unmapped identifier must not widen to any record
                    out.pushable.insert(ID_FIELD.to_string(), FilterValue::many([NO_MATCH]));
                }
                route(&mut out, mapping, name, FilterValue::one(value.clone()));
            }
            return out;
        }

        let mut consumed = Consumed::default();
        out.page = self.page_request(input, &mut consumed);

        let empty = BTreeMap::new();
        let fields = self
            .catalog
            .schema_for(&mapping.id)
            .and_then(|schema| schema.fields_for(&mapping.id))
            .unwrap_or(&empty);

        for name in fields.keys() {
            if let Some(value) = find_parameter(input, name, &mut consumed, &mut out.warnings) {
                route(&mut out, mapping, name, value);
            }
        }

        for (name, definition) in fields {
            self.reference_filter(input, mapping, name, definition, &mut consumed, &mut out)
                .await;
        }

        if let Some(method) = input.method {
            for name in method.query_parameters() {
                if fields.contains_key(name) || consumed.query.contains(name) {
                    continue;
                }
                if let Some(value) = input.query.get(name) {
                    consumed.query.insert(name.to_string());
                    if !value.is_empty() {
                        route(&mut out, mapping, name, FilterValue::one(value.clone()));
                    }
                }
            }
        }

        for key in input.query.keys() {
            if !consumed.query.contains(key) && !is_reserved(key) {
                out.warnings.push(format!("Unsupported query filter: {key}"));
            }
        }
        if let Some(body) = input.body {
            for key in body.keys() {
                if !consumed.body.contains(key) && !is_reserved(key) {
                    out.warnings.push(format!("Unsupported filter: {key}"));
                }
            }
        }

        debug!(
            pushable = out.pushable.len(),
            post = out.post.len(),
            warnings = out.warnings.len(),
            "Translated request filters"
        );
        out
    }

    fn page_request(&self, input: &TranslateInput<'_>, consumed: &mut Consumed) -> PageRequest {
        let read = |key: &str, consumed: &mut Consumed| -> Option<i64> {
            if let Some(raw) = input.query.get(key) {
                consumed.query.insert(key.to_string());
                return raw.trim().parse().ok();
            }
            let value = input.body?.get(key)?;
            consumed.body.insert(key.to_string());
            value.as_i64().or_else(|| value.as_str()?.trim().parse().ok())
        };

        let page = read("page", consumed);
        let size = read("pageSize", consumed);
        if !input.paginate {
            return PageRequest::unpaged();
        }
        self.pagination.clamp(page, size)
    }

    /// `<field><SubField>` parameters on a field holding another datatype,
    /// resolved to the referenced identifiers
    async fn reference_filter(
        &self,
        input: &TranslateInput<'_>,
        mapping: &DatatypeMapping,
        name: &str,
        definition: &FieldDefinition,
        consumed: &mut Consumed,
        out: &mut TranslatedQuery,
    ) {
        let Some(ref datatype) = definition.datatype else {
            return;
        };
        let Some(backend) = reference_backend_field(mapping, name) else {
            return;
        };
        let target_id = mapping.id.sibling(datatype);
        let Some(target) = self.catalog.mapping(&target_id) else {
            return;
        };

        let prefixes = [name.to_string(), lcfirst(datatype)];
        let mut filters = Map::new();

        let query = input
            .query
            .iter()
            .filter(|(key, _)| !consumed.query.contains(*key))
            .map(|(key, value)| (key.clone(), Value::String(value.clone()), false));
        let body = input
            .body
            .into_iter()
            .flatten()
            .filter(|(key, _)| !consumed.body.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone(), true));
        let candidates: Vec<(String, Value, bool)> = query.chain(body).collect();

        for (key, value, from_body) in candidates {
            let Some(prefix) = prefixes.iter().find(|p| has_sub_field(&key, p)) else {
                continue;
            };
            let sub_field = lcfirst(&inflector::singular(&key[prefix.len()..]));
            let qualified = inflector::singular(&key);
            let field = [qualified.as_str(), sub_field.as_str()]
                .into_iter()
                .find_map(|candidate| target.find_rule(candidate).map(|(field, _)| field.to_string()));
            let Some(field) = field else {
                continue;
            };

            if from_body {
                consumed.body.insert(key.clone());
            } else {
                consumed.query.insert(key.clone());
            }
            if !FilterValue::from_json(value.clone()).is_empty() {
                filters.insert(field, value);
            }
        }

        if filters.is_empty() {
            return;
        }

        let ids = self.lookup.lookup_ids(&target_id, filters).await;
        let value = if ids.is_empty() {
            FilterValue::many([NO_MATCH])
        } else {
            FilterValue::many(ids)
        };
        out.pushable.insert(backend, value);
    }
}

/// Route one BrAPI-level filter by the mapping rule of `field`
fn route(out: &mut TranslatedQuery, mapping: &DatatypeMapping, field: &str, value: FilterValue) {
    match mapping.filter_route(field) {
        FilterRoute::Store(backend) => {
            out.pushable.insert(backend, value);
        },
        FilterRoute::PostFilter => {
            out.post.insert(field.to_string(), value);
        },
        FilterRoute::Unsupported => out.warnings.push(format!("Unsupported filter: {field}")),
    }
}

/// Find the value of schema field `name` among the request parameters
///
/// Query string first (exact, plural, singular), then the body in the same
/// order, then the body case-insensitively.
fn find_parameter(
    input: &TranslateInput<'_>,
    name: &str,
    consumed: &mut Consumed,
    warnings: &mut Vec<String>,
) -> Option<FilterValue> {
    let forms = [name.to_string(), inflector::plural(name), inflector::singular(name)];

    for form in &forms {
        if consumed.query.contains(form) {
            continue;
        }
        if let Some(value) = input.query.get(form) {
            consumed.query.insert(form.clone());
            return non_empty(FilterValue::one(value.clone()));
        }
    }

    let body = input.body?;
    for form in &forms {
        if consumed.body.contains(form) {
            continue;
        }
        if let Some(value) = body.get(form) {
            consumed.body.insert(form.clone());
            return non_empty(FilterValue::from_json(value.clone()));
        }
    }

    let (key, value) = body.iter().find(|(key, _)| {
        !consumed.body.contains(*key) && forms.iter().any(|form| form.eq_ignore_ascii_case(key))
    })?;
    warnings.push(format!("Filter '{key}' matched field '{name}' ignoring case"));
    consumed.body.insert(key.clone());
    non_empty(FilterValue::from_json(value.clone()))
}

fn non_empty(value: FilterValue) -> Option<FilterValue> {
    (!value.is_empty()).then_some(value)
}

fn is_reserved(key: &str) -> bool {
    crate::mapping::schema::RESERVED_PARAMETERS.contains(&key)
}

/// Backend reference field that holds the identifiers of `field`'s objects
fn reference_backend_field(mapping: &DatatypeMapping, field: &str) -> Option<String> {
    match &mapping.rule(field)?.rule {
        FieldRule::Direct { field } => Some(field.clone()),
        FieldRule::SubMapping {
            source: SubMappingSource::Field { field },
            ..
        } => Some(field.clone()),
        _ => None,
    }
}

/// `key` is `prefix` followed by a capitalised sub-field
fn has_sub_field(key: &str, prefix: &str) -> bool {
    key.len() > prefix.len()
        && key.starts_with(prefix)
        && key[prefix.len()..].starts_with(|c: char| c.is_ascii_uppercase())
}

fn lcfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
