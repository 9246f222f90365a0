//! Backend store abstraction
//!
//! The pipeline issues no raw SQL. Everything goes through the four
//! primitives on `CatalogStore`: `select`, `bulk_insert`, `bulk_upsert`,
//! `update`. Rows travel as JSON documents; `SqliteStore` maps them onto
//! the sqlx pool, and tests substitute an in-memory implementation.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, QueryBuilder, Row, Sqlite, SqlitePool, TypeInfo};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Table names used by the pipeline.
pub mod tables {
    pub const RAW_RECORDS: &str = "raw_records";
    pub const NORMALIZED_PRODUCTS: &str = "normalized_products";
    pub const COLLECTION_RUNS: &str = "collection_runs";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// One filter clause. Kept deliberately small: the pipeline only ever
/// filters on equality and id-membership.
#[derive(Debug, Clone)]
pub enum FilterClause {
    Eq(String, Value),
    In(String, Vec<Value>),
}

/// Conjunction of clauses applied to a table.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(FilterClause::Eq(field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn is_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.clauses.push(FilterClause::In(field.to_string(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// Row predicate used by non-SQL store implementations. Booleans and
    /// 0/1 integers compare equal because SQLite stores booleans as
    /// integers.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            FilterClause::Eq(field, expected) => {
                row.get(field).is_some_and(|actual| loose_eq(actual, expected))
            }
            FilterClause::In(field, values) => row
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| loose_eq(actual, v))),
        })
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Bool(flag), Value::Number(n)) | (Value::Number(n), Value::Bool(flag)) => {
            n.as_i64() == Some(i64::from(*flag))
        }
        _ => false,
    }
}

/// Offset pagination for `select`. Rows come back in stable insertion
/// order so a paged snapshot loop sees each row exactly once.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// The four backend primitives the pipeline is allowed to use.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        page: Option<Page>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Pure insert. Fails on a key collision; the bulk writer handles the
    /// fallback policy, not the store.
    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<u64, StoreError>;

    /// Insert-or-update keyed on `conflict_keys`.
    async fn bulk_upsert(
        &self,
        table: &str,
        rows: &[Value],
        conflict_keys: &[&str],
    ) -> Result<u64, StoreError>;

    /// Patch all rows matching `filter` with the fields of `patch`.
    async fn update(&self, table: &str, filter: &Filter, patch: &Value) -> Result<u64, StoreError>;
}

/// sqlx-backed store over SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn columns_of(row: &Value) -> Result<Vec<String>, StoreError> {
        let object = row
            .as_object()
            .ok_or_else(|| StoreError::InvalidRow("row is not a JSON object".to_string()))?;
        let mut columns: Vec<String> = object.keys().cloned().collect();
        columns.sort();
        Ok(columns)
    }

    fn push_where(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
        if filter.is_empty() {
            return;
        }
        builder.push(" WHERE ");
        for (i, clause) in filter.clauses().iter().enumerate() {
            if i > 0 {
                builder.push(" AND ");
            }
            match clause {
                FilterClause::Eq(field, value) => {
                    builder.push(format!("{field} = "));
                    push_bind(builder, value);
                }
                FilterClause::In(field, values) => {
                    builder.push(format!("{field} IN ("));
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            builder.push(", ");
                        }
                        push_bind(builder, value);
                    }
                    builder.push(")");
                }
            }
        }
    }
}

fn push_bind(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            builder.push_bind(Option::<String>::None);
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                builder.push_bind(i);
            } else {
                builder.push_bind(n.as_f64().unwrap_or_default());
            }
        }
        Value::String(s) => {
            builder.push_bind(s.clone());
        }
        // Nested documents are stored as their JSON text
        other => {
            builder.push_bind(other.to_string());
        }
    }
}

fn decode_row(row: &SqliteRow) -> Result<Value, StoreError> {
    let mut object = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(i)?
                .map_or(Value::Null, Value::from),
            "REAL" => row
                .try_get::<Option<f64>, _>(i)?
                .map_or(Value::Null, Value::from),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(i)?
                .map_or(Value::Null, Value::from),
            _ => row
                .try_get::<Option<String>, _>(i)?
                .map_or(Value::Null, Value::from),
        };
        object.insert(name, value);
    }
    Ok(Value::Object(object))
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        page: Option<Page>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!("SELECT * FROM {table}"));
        Self::push_where(&mut builder, filter);
        builder.push(" ORDER BY rowid");
        if let Some(page) = page {
            builder.push(" LIMIT ");
            builder.push_bind(i64::from(page.limit));
            builder.push(" OFFSET ");
            builder.push_bind(page.offset as i64);
        }

        let rows = builder.build().fetch_all(&*self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<u64, StoreError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns = Self::columns_of(first)?;

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {table} ({}) ", columns.join(", ")));
        builder.push_values(rows, |mut b, row| {
            for column in &columns {
                let value = row.get(column).unwrap_or(&Value::Null);
                match value {
                    Value::Null => {
                        b.push_bind(Option::<String>::None);
                    }
                    Value::Bool(flag) => {
                        b.push_bind(*flag);
                    }
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            b.push_bind(i);
                        } else {
                            b.push_bind(n.as_f64().unwrap_or_default());
                        }
                    }
                    Value::String(s) => {
                        b.push_bind(s.clone());
                    }
                    other => {
                        b.push_bind(other.to_string());
                    }
                }
            }
        });

        let result = builder.build().execute(&*self.pool).await?;
        debug!(table, rows = rows.len(), "bulk insert completed");
        Ok(result.rows_affected())
    }

    async fn bulk_upsert(
        &self,
        table: &str,
        rows: &[Value],
        conflict_keys: &[&str],
    ) -> Result<u64, StoreError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns = Self::columns_of(first)?;

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {table} ({}) ", columns.join(", ")));
        builder.push_values(rows, |mut b, row| {
            for column in &columns {
                let value = row.get(column).unwrap_or(&Value::Null);
                match value {
                    Value::Null => {
                        b.push_bind(Option::<String>::None);
                    }
                    Value::Bool(flag) => {
                        b.push_bind(*flag);
                    }
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            b.push_bind(i);
                        } else {
                            b.push_bind(n.as_f64().unwrap_or_default());
                        }
                    }
                    Value::String(s) => {
                        b.push_bind(s.clone());
                    }
                    other => {
                        b.push_bind(other.to_string());
                    }
                }
            }
        });

        builder.push(format!(" ON CONFLICT({}) DO UPDATE SET ", conflict_keys.join(", ")));
        let updatable: Vec<&String> = columns
            .iter()
            .filter(|c| !conflict_keys.contains(&c.as_str()))
            .collect();
        for (i, column) in updatable.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(format!("{column} = excluded.{column}"));
        }

        let result = builder.build().execute(&*self.pool).await?;
        debug!(table, rows = rows.len(), "bulk upsert completed");
        Ok(result.rows_affected())
    }

    async fn update(&self, table: &str, filter: &Filter, patch: &Value) -> Result<u64, StoreError> {
        let fields = patch
            .as_object()
            .ok_or_else(|| StoreError::InvalidRow("patch is not a JSON object".to_string()))?;
        if fields.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!("UPDATE {table} SET "));
        for (i, (field, value)) in fields.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(format!("{field} = "));
            push_bind(&mut builder, value);
        }
        Self::push_where(&mut builder, filter);

        let result = builder.build().execute(&*self.pool).await?;
        Ok(result.rows_affected())
    }
}
