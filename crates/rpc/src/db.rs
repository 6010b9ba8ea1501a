//! Database collaborator: named tables of JSON rows.
//!
//! Handlers are the only layer that talks to a [`Database`]. The core never
//! wraps multi-step writes in a transaction; check-then-insert sequences are
//! each handler's responsibility.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub type Row = Map<String, Value>;

pub type DbHandle = Arc<dyn Database>;

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

pub const ID_FIELD: &str = "id";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Duplicate id {id} in table {table}")]
    DuplicateId { table: String, id: String },

    #[error("Row codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Expected a JSON object row")]
    NotAnObject,
}

/// Conjunction of equality predicates.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn by_id(id: &str) -> Self {
        Self::all().eq(ID_FIELD, id)
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| row.get(field) == Some(value))
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn select(&self, table: &str, filter: &Filter) -> DbResult<Vec<Row>>;

    /// Inserts a row, assigning an `id` when the row carries none.
    async fn insert(&self, table: &str, row: Row) -> DbResult<Row>;

    /// Merges `patch` into the row; `None` when no row has that id.
    async fn update(&self, table: &str, id: &str, patch: Row) -> DbResult<Option<Row>>;

    async fn delete(&self, table: &str, id: &str) -> DbResult<bool>;

    async fn find_one(&self, table: &str, filter: &Filter) -> DbResult<Option<Row>> {
        Ok(self.select(table, filter).await?.into_iter().next())
    }
}

pub fn to_row<T: Serialize>(value: &T) -> DbResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(DatabaseError::NotAnObject),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> DbResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<String, Row>,
    next_id: u64,
}

/// In-process tables behind one lock. Table names are fixed at construction.
pub struct MemoryDatabase {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemoryDatabase {
    pub fn with_tables(names: &[&str]) -> Self {
        let tables = names
            .iter()
            .map(|name| (name.to_string(), Table::default()))
            .collect();
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn select(&self, table: &str, filter: &Filter) -> DbResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let t = tables
            .get(table)
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
        Ok(t.rows.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn insert(&self, table: &str, mut row: Row) -> DbResult<Row> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;

        let id = match row.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                t.next_id += 1;
                // Zero-padded so key order follows insertion order.
                let id = format!("{:08}", t.next_id);
                row.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        if t.rows.contains_key(&id) {
            return Err(DatabaseError::DuplicateId {
                table: table.to_string(),
                id,
            });
        }
        t.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> DbResult<Option<Row>> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
        let Some(row) = t.rows.get_mut(id) else {
            return Ok(None);
        };
        for (key, value) in patch {
            if key != ID_FIELD {
                row.insert(key, value);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: &str, id: &str) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
        Ok(t.rows.remove(id).is_some())
    }
}
