//! PostgreSQL record store
//!
//! All kinds share the `brapi_records` table. Field data lives in a `jsonb`
//! column using the [`FieldData`] serialisation: plain values as a JSON array,
//! references as `{"target_kind": ..., "ids": [...]}`.

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    ContentTarget, FieldData, FilterSet, QueryPage, QueryRange, Record, RecordStore, StoreError,
    StoreResult, ID_FIELD,
};

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Append `kind`, bundle and filter predicates to a query ending in `WHERE `
fn push_predicates(
    builder: &mut QueryBuilder<'_, Postgres>,
    target: &ContentTarget,
    filters: &FilterSet,
) {
    builder.push("kind = ");
    builder.push_bind(target.kind.clone());

    if let Some(ref bundle) = target.bundle {
        builder.push(" AND bundle = ");
        builder.push_bind(bundle.clone());
    }

    for (field, filter) in filters {
        let candidates = filter.candidates();
        if field == ID_FIELD {
            builder.push(" AND id = ANY(");
            builder.push_bind(candidates);
            builder.push(")");
            continue;
        }

        // Plain values are stored as an array, references under "ids".
        builder.push(
            " AND EXISTS (SELECT 1 FROM jsonb_array_elements_text(CASE WHEN jsonb_typeof(fields->",
        );
        builder.push_bind(field.clone());
        builder.push(") = 'array' THEN fields->");
        builder.push_bind(field.clone());
        builder.push(" ELSE fields->");
        builder.push_bind(field.clone());
        builder.push("->'ids' END) AS item(v) WHERE item.v = ANY(");
        builder.push_bind(candidates);
        builder.push("))");
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Record> {
    let Json(fields): Json<BTreeMap<String, FieldData>> = row.try_get("fields")?;
    Ok(Record {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        bundle: row.try_get("bundle")?,
        fields,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = error {
        return db_err.is_unique_violation();
    }
    false
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[tracing::instrument(skip(self, filters), fields(kind = %target.kind))]
    async fn query(
        &self,
        target: &ContentTarget,
        filters: &FilterSet,
        range: Option<QueryRange>,
    ) -> StoreResult<QueryPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM brapi_records WHERE ");
        push_predicates(&mut count, target, filters);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT id FROM brapi_records WHERE ");
        push_predicates(&mut select, target, filters);
        select.push(" ORDER BY seq");
        if let Some(range) = range {
            select.push(" LIMIT ");
            select.push_bind(range.limit as i64);
            select.push(" OFFSET ");
            select.push_bind(range.offset as i64);
        }
        let ids = select.build_query_scalar::<String>().fetch_all(&self.pool).await?;

        debug!(total, returned = ids.len(), "Postgres query");
        Ok(QueryPage {
            ids,
            total_count: total.max(0) as u64,
        })
    }

    async fn load_many(&self, kind: &str, ids: &[String]) -> StoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, kind, bundle, fields
            FROM brapi_records
            WHERE kind = $1 AND id = ANY($2)
            "#,
        )
        .bind(kind)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id = BTreeMap::new();
        for row in &rows {
            let record = record_from_row(row)?;
            by_id.insert(record.id.clone(), record);
        }
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn create(
        &self,
        target: &ContentTarget,
        id: Option<String>,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let row = sqlx::query(
            r#"
            INSERT INTO brapi_records (kind, id, bundle, fields)
            VALUES ($1, $2, $3, $4)
            RETURNING id, kind, bundle, fields
            "#,
        )
        .bind(&target.kind)
        .bind(&id)
        .bind(&target.bundle)
        .bind(Json(&fields))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate {
                    kind: target.kind.clone(),
                    id: id.clone(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        record_from_row(&row)
    }

    async fn update_fields(
        &self,
        kind: &str,
        id: &str,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record> {
        let row = sqlx::query(
            r#"
            UPDATE brapi_records
            SET fields = fields || $3, updated_at = NOW()
            WHERE kind = $1 AND id = $2
            RETURNING id, kind, bundle, fields
            "#,
        )
        .bind(kind)
        .bind(id)
        .bind(Json(&fields))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;

        record_from_row(&row)
    }

    async fn delete(&self, kind: &str, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM brapi_records WHERE kind = $1 AND id = $2")
            .bind(kind)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
