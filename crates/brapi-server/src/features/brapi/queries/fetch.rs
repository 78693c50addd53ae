//! List or get objects of a call

use mediator::Request;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BrapiResult;
use crate::mapping::MethodDefinition;
use crate::query::{BrapiEngine, DataPage, DataRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchObjectsQuery {
    pub version: String,
    pub datatype: String,
    /// Template parameters; non-empty for single-object calls
    pub path_params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    #[serde(skip)]
    pub method: Option<MethodDefinition>,
}

impl Request<BrapiResult<DataPage>> for FetchObjectsQuery {}

impl FetchObjectsQuery {
    pub fn is_single(&self) -> bool {
        !self.path_params.is_empty()
    }
}

#[tracing::instrument(skip(engine, query), fields(datatype = %query.datatype))]
pub async fn handle(engine: &BrapiEngine, query: FetchObjectsQuery) -> BrapiResult<DataPage> {
    let mapping = engine.mapping_for(&query.version, &query.datatype)?;
    let request = DataRequest {
        path_params: query.path_params,
        query: query.query,
        method: query.method,
        paginate: true,
        ..DataRequest::default()
    };
    engine.fetch(mapping, &request).await
}
