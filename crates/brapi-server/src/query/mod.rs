//! BrAPI data retrieval
//!
//! [`BrapiEngine::fetch`] runs the read pipeline for one datatype mapping:
//!
//! 1. [`translator::QueryTranslator`] splits the request parameters into
//!    store filters and post-filters
//! 2. the [`RecordStore`] returns matching identifiers (one page of them when
//!    there are no post-filters, all of them otherwise)
//! 3. [`projector::ObjectProjector`] builds the BrAPI objects
//! 4. [`post_filter`] applies the remaining filters and cuts the page

pub mod post_filter;
pub mod projector;
pub mod translator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::BrapiError;
use crate::mapping::{DatatypeMapping, MappingCatalog, MappingId, MethodDefinition};
use crate::storage::{QueryRange, RecordStore};

pub use projector::ObjectProjector;
pub use translator::{QueryTranslator, ReferenceLookup, TranslateInput, TranslatedQuery, NO_MATCH};

/// Page size limits applied to client requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSettings {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 1000,
        }
    }
}

impl PaginationSettings {
    /// Page request from raw client values: negative pages become 0,
    /// missing or non-positive sizes the default, sizes over the ceiling the
    /// ceiling
    pub fn clamp(&self, page: Option<i64>, page_size: Option<i64>) -> PageRequest {
        let page = page.filter(|p| *p >= 0).unwrap_or(0) as u64;
        let page_size = match page_size {
            Some(size) if size > 0 => (size as u64).min(self.max_page_size),
            _ => self.default_page_size,
        };
        PageRequest::new(page, Some(page_size))
    }

    /// Clamped `page`/`pageSize` of the query string, else of a JSON body
    pub fn page_from(
        &self,
        query: &BTreeMap<String, String>,
        body: Option<&Map<String, Value>>,
    ) -> PageRequest {
        let read = |key: &str| -> Option<i64> {
            if let Some(raw) = query.get(key) {
                return raw.trim().parse().ok();
            }
            let value = body?.get(key)?;
            value.as_i64().or_else(|| value.as_str()?.trim().parse().ok())
        };
        self.clamp(read("page"), read("pageSize"))
    }
}

/// Zero-based page; no page size means everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: Option<u64>,
}

impl PageRequest {
    pub fn new(page: u64, page_size: Option<u64>) -> Self {
        Self { page, page_size }
    }

    pub fn unpaged() -> Self {
        Self::default()
    }

    /// Store range for this page
    pub fn range(&self) -> Option<QueryRange> {
        self.page_size.map(|size| QueryRange {
            offset: self.page.saturating_mul(size),
            limit: size,
        })
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        match self.page_size {
            Some(0) => 0,
            Some(size) => total_count.div_ceil(size),
            None if total_count > 0 => 1,
            None => 0,
        }
    }

    /// Cut this page out of a complete, in-memory result
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        match self.range() {
            Some(range) => items
                .iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .cloned()
                .collect(),
            None => items.to_vec(),
        }
    }
}

/// Parameters of one data request
#[derive(Debug, Clone, Default)]
pub struct DataRequest {
    pub path_params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Filters of a search call
    pub body: Option<Map<String, Value>>,
    /// Declared definition of the call's method
    pub method: Option<MethodDefinition>,
    pub include_hidden: bool,
    pub paginate: bool,
}

impl DataRequest {
    pub fn list(query: BTreeMap<String, String>) -> Self {
        Self {
            query,
            paginate: true,
            ..Default::default()
        }
    }

    pub fn search(body: Map<String, Value>) -> Self {
        Self {
            body: Some(body),
            paginate: true,
            ..Default::default()
        }
    }

    pub fn single(path_params: BTreeMap<String, String>) -> Self {
        Self {
            path_params,
            paginate: true,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Option<MethodDefinition>) -> Self {
        self.method = method;
        self
    }

    pub fn unpaged(mut self) -> Self {
        self.paginate = false;
        self
    }

    pub fn with_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }
}

/// A projected record with its backend identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub record_id: String,
    pub object: Value,
}

/// One page of projected objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPage {
    pub items: Vec<Projection>,
    pub total_count: u64,
    pub page: PageRequest,
    pub warnings: Vec<String>,
}

impl DataPage {
    pub fn objects(&self) -> Vec<Value> {
        self.items.iter().map(|item| item.object.clone()).collect()
    }

    pub fn total_pages(&self) -> u64 {
        self.page.total_pages(self.total_count)
    }
}

/// Read pipeline over a catalog and a record store
#[derive(Clone)]
pub struct BrapiEngine {
    catalog: Arc<MappingCatalog>,
    store: Arc<dyn RecordStore>,
    pagination: PaginationSettings,
}

impl BrapiEngine {
    pub fn new(
        catalog: Arc<MappingCatalog>,
        store: Arc<dyn RecordStore>,
        pagination: PaginationSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            pagination,
        }
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn pagination(&self) -> PaginationSettings {
        self.pagination
    }

    pub fn projector(&self) -> ObjectProjector<'_> {
        ObjectProjector::new(&self.catalog, self.store.as_ref())
    }

    /// Top-level mapping of `datatype` in the active release of `version`
    pub fn mapping_for(&self, version: &str, datatype: &str) -> Result<&DatatypeMapping, BrapiError> {
        self.catalog.datatype_mapping(version, datatype).ok_or_else(|| {
            BrapiError::NotFound(format!("No mapping for {datatype} in BrAPI {version}"))
        })
    }

    /// Translate, query, project and post-filter
    ///
    /// A request addressing a single record fails with `NotFound` when
    /// nothing matches; list requests return an empty page.
    #[tracing::instrument(skip(self, mapping, request), fields(mapping = %mapping.id))]
    pub async fn fetch(
        &self,
        mapping: &DatatypeMapping,
        request: &DataRequest,
    ) -> Result<DataPage, BrapiError> {
        let translator = QueryTranslator::new(&self.catalog, self, self.pagination);
        let input = TranslateInput {
            path_params: &request.path_params,
            query: &request.query,
            body: request.body.as_ref(),
            method: request.method.as_ref(),
            paginate: request.paginate,
        };
        let translated = translator.translate(&input, mapping).await;
        for warning in &translated.warnings {
            debug!(mapping = %mapping.id, warning = %warning, "Filter warning");
        }

        let target = &mapping.content_target;
        let projector = self.projector();
        let (items, total_count) = if translated.post.is_empty() {
            let found = self
                .store
                .query(target, &translated.pushable, translated.page.range())
                .await?;
            let records = self.store.load_many(&target.kind, &found.ids).await?;
            let mut items = Vec::with_capacity(records.len());
            for record in &records {
                items.push(Projection {
                    record_id: record.id.clone(),
                    object: projector.project(record, mapping, request.include_hidden).await,
                });
            }
            (items, found.total_count)
        } else {
            let found = self.store.query(target, &translated.pushable, None).await?;
            let records = self.store.load_many(&target.kind, &found.ids).await?;
            let mut candidates = Vec::with_capacity(records.len());
            for record in &records {
                candidates.push(Projection {
                    record_id: record.id.clone(),
                    object: projector.project(record, mapping, request.include_hidden).await,
                });
            }
            post_filter::apply_and_paginate_by(candidates, &translated.post, translated.page, |item| {
                &item.object
            })
        };

        if translated.single_record && items.is_empty() {
            return Err(BrapiError::NotFound(format!(
                "No {} matches the requested identifier",
                mapping.id.datatype
            )));
        }

        Ok(DataPage {
            items,
            total_count,
            page: translated.page,
            warnings: translated.warnings,
        })
    }
}

#[async_trait]
impl ReferenceLookup for BrapiEngine {
    async fn lookup_ids(&self, mapping: &MappingId, filters: Map<String, Value>) -> Vec<String> {
        let Some(target) = self.catalog.mapping(mapping) else {
            warn!(mapping = %mapping, "Reference filter on unknown mapping");
            return Vec::new();
        };

        let request = DataRequest::search(filters).unpaged().with_hidden();
        match self.fetch(target, &request).await {
            Ok(page) => page.items.into_iter().map(|item| item.record_id).collect(),
            Err(e) => {
                warn!(mapping = %mapping, error = %e, "Reference filter lookup failed");
                Vec::new()
            },
        }
    }
}
