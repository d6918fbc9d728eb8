//! Keyed table storage.
//!
//! A [`Store`] keeps rows of registered [`TableSchema`]s addressed by their
//! natural key. `upsert_batch` is all-or-nothing: every row of the batch is
//! checked before anything becomes visible.

pub mod arrow_store;
pub mod memory;

pub use arrow_store::ArrowStore;
pub use memory::MemoryStore;

use crate::errors::{DataHubError, Result};
use crate::models::schema::{FieldValue, Row, RowKey, StoredRecord, TableSchema};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertCounts {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// Rows already classified against the store's current keys.
#[derive(Debug, Clone, Default)]
pub struct UpsertBatch {
    pub inserts: Vec<Row>,
    pub updates: Vec<Row>,
}

impl UpsertBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Single-value queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarQuery {
    /// `SELECT MAX(column) FROM table`; `Null` on an empty table.
    Max { table: &'static str, column: &'static str },
    /// `SELECT COUNT(*) FROM table`.
    Count { table: &'static str },
}

pub trait Store {
    /// Registers the table, creating its storage when missing.
    fn create_schema_if_absent(&mut self, schema: &'static TableSchema) -> Result<()>;

    fn read_scalar(&self, query: &ScalarQuery) -> Result<FieldValue>;

    fn load_all(&self, schema: &'static TableSchema) -> Result<Vec<Row>>;

    /// Rows of one partition of a partitioned table.
    fn load_partition(&self, schema: &'static TableSchema, partition: &str) -> Result<Vec<Row>>;

    /// Natural keys currently stored, optionally restricted to one partition.
    fn load_keys(&self, schema: &'static TableSchema, partition: Option<&str>) -> Result<HashSet<RowKey>> {
        let rows = match partition {
            Some(p) => self.load_partition(schema, p)?,
            None => self.load_all(schema)?,
        };
        rows.iter().map(|row| schema.key_of(row)).collect()
    }

    /// Applies the whole batch or nothing.
    ///
    /// For partitioned tables a store may require every row of the batch to
    /// share one partition value; [`ArrowStore`] refuses batches that don't.
    fn upsert_batch(&mut self, schema: &'static TableSchema, batch: &UpsertBatch) -> Result<UpsertCounts>;
}

/// Typed variant of [`Store::load_all`].
pub fn load_records<R: StoredRecord, S: Store + ?Sized>(store: &S) -> Result<Vec<R>> {
    store
        .load_all(R::schema())?
        .iter()
        .map(R::from_row)
        .collect()
}

/// Typed variant of [`Store::load_partition`].
pub fn load_partition_records<R: StoredRecord, S: Store + ?Sized>(store: &S, partition: &str) -> Result<Vec<R>> {
    store
        .load_partition(R::schema(), partition)?
        .iter()
        .map(R::from_row)
        .collect()
}

/// Checks every row of `batch` against the schema and the existing keys and
/// returns the writes to apply. Nothing is applied here, so an error leaves the
/// caller's table untouched.
pub(crate) fn stage_batch(
    schema: &TableSchema,
    existing: &BTreeMap<RowKey, Row>,
    batch: &UpsertBatch,
) -> Result<(Vec<(RowKey, Row)>, UpsertCounts)> {
    let mut staged_keys = HashSet::new();
    let mut writes = Vec::with_capacity(batch.inserts.len() + batch.updates.len());

    for (rows, is_insert) in [(&batch.inserts, true), (&batch.updates, false)] {
        for row in rows {
            schema.validate(row)?;
            let key = schema.key_of(row)?;
            if !staged_keys.insert(key.clone()) {
                return Err(DataHubError::StoreError(format!(
                    "{}: key {} appears twice in one batch",
                    schema.name, key
                )));
            }
            match (is_insert, existing.contains_key(&key)) {
                (true, true) => {
                    return Err(DataHubError::StoreError(format!(
                        "{}: duplicate key {} on insert",
                        schema.name, key
                    )));
                }
                (false, false) => {
                    return Err(DataHubError::StoreError(format!(
                        "{}: key {} vanished before update",
                        schema.name, key
                    )));
                }
                _ => writes.push((key, row.clone())),
            }
        }
    }

    let counts = UpsertCounts {
        inserted: batch.inserts.len(),
        updated: batch.updates.len(),
    };
    Ok((writes, counts))
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.cmp(y)),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => Some(x.cmp(y)),
        (FieldValue::Float(x), FieldValue::Float(y)) => x.partial_cmp(y),
        (FieldValue::Date(x), FieldValue::Date(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Evaluates a scalar query over the rows of its table.
pub(crate) fn eval_scalar<'a>(
    schema: &TableSchema,
    rows: impl Iterator<Item = &'a Row>,
    query: &ScalarQuery,
) -> Result<FieldValue> {
    match query {
        ScalarQuery::Count { .. } => Ok(FieldValue::Integer(rows.count() as i64)),
        ScalarQuery::Max { column, .. } => {
            let idx = schema.index_of(column).ok_or_else(|| {
                DataHubError::StoreError(format!("{} has no field {}", schema.name, column))
            })?;
            let mut best = FieldValue::Null;
            for value in rows.filter_map(|row| row.get(idx)).filter(|v| !v.is_null()) {
                if best.is_null() || compare_values(value, &best) == Some(Ordering::Greater) {
                    best = value.clone();
                }
            }
            Ok(best)
        }
    }
}

impl ScalarQuery {
    pub fn table(&self) -> &'static str {
        match self {
            ScalarQuery::Max { table, .. } | ScalarQuery::Count { table } => *table,
        }
    }
}
