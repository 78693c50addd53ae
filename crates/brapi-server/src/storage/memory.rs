//! In-process record store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    ContentTarget, FieldData, FilterSet, QueryPage, QueryRange, Record, RecordStore, StoreError,
    StoreResult,
};

/// Records held in memory, per kind, in insertion order
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    kinds: RwLock<BTreeMap<String, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut kinds: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in records {
            kinds.entry(record.kind.clone()).or_default().push(record);
        }
        Self {
            kinds: RwLock::new(kinds),
        }
    }

    /// Load a JSON array of records
    pub fn from_seed_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let records: Vec<Record> = serde_json::from_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            count = records.len(),
            "Seeded memory record store"
        );
        Ok(Self::from_records(records))
    }

    pub async fn count(&self, kind: &str) -> usize {
        self.kinds.read().await.get(kind).map_or(0, Vec::len)
    }
}

/// Next numeric identifier after the largest numeric one in use
fn next_id(records: &[Record]) -> String {
    let max = records
        .iter()
        .filter_map(|record| record.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query(
        &self,
        target: &ContentTarget,
        filters: &FilterSet,
        range: Option<QueryRange>,
    ) -> StoreResult<QueryPage> {
        let kinds = self.kinds.read().await;
        let matching: Vec<String> = kinds
            .get(&target.kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| target.bundle.is_none() || record.bundle == target.bundle)
                    .filter(|record| record.matches(filters))
                    .map(|record| record.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let total_count = matching.len() as u64;
        let ids = match range {
            Some(range) => matching
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect(),
            None => matching,
        };

        debug!(kind = %target.kind, total = total_count, returned = ids.len(), "Memory query");
        Ok(QueryPage { ids, total_count })
    }

    async fn load_many(&self, kind: &str, ids: &[String]) -> StoreResult<Vec<Record>> {
        let kinds = self.kinds.read().await;
        let Some(records) = kinds.get(kind) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|record| &record.id == id).cloned())
            .collect())
    }

    async fn create(
        &self,
        target: &ContentTarget,
        id: Option<String>,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record> {
        let mut kinds = self.kinds.write().await;
        let records = kinds.entry(target.kind.clone()).or_default();
        let id = id.unwrap_or_else(|| next_id(records));
        if records.iter().any(|record| record.id == id) {
            return Err(StoreError::Duplicate {
                kind: target.kind.clone(),
                id,
            });
        }

        let record = Record {
            id,
            kind: target.kind.clone(),
            bundle: target.bundle.clone(),
            fields,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn update_fields(
        &self,
        kind: &str,
        id: &str,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record> {
        let mut kinds = self.kinds.write().await;
        let record = kinds
            .get_mut(kind)
            .and_then(|records| records.iter_mut().find(|record| record.id == id))
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })?;
        record.fields.extend(fields);
        Ok(record.clone())
    }

    async fn delete(&self, kind: &str, id: &str) -> StoreResult<bool> {
        let mut kinds = self.kinds.write().await;
        let Some(records) = kinds.get_mut(kind) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|record| record.id != id);
        Ok(records.len() < before)
    }
}
