use crate::errors::{DataHubError, Result};
use crate::models::schema::{FieldValue, Row, RowKey, TableSchema};
use crate::store::{eval_scalar, stage_batch, ScalarQuery, Store, UpsertBatch, UpsertCounts};
use std::collections::{BTreeMap, HashMap};

struct MemoryTable {
    schema: &'static TableSchema,
    rows: BTreeMap<RowKey, Row>,
}

/// In-process store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: HashMap<&'static str, MemoryTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| DataHubError::StoreError(format!("Unknown table {}", name)))
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map(|t| t.rows.len()).unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn create_schema_if_absent(&mut self, schema: &'static TableSchema) -> Result<()> {
        self.tables.entry(schema.name).or_insert_with(|| MemoryTable {
            schema,
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    fn read_scalar(&self, query: &ScalarQuery) -> Result<FieldValue> {
        let table = self.table(query.table())?;
        eval_scalar(table.schema, table.rows.values(), query)
    }

    fn load_all(&self, schema: &'static TableSchema) -> Result<Vec<Row>> {
        Ok(self.table(schema.name)?.rows.values().cloned().collect())
    }

    fn load_partition(&self, schema: &'static TableSchema, partition: &str) -> Result<Vec<Row>> {
        if schema.partition_key.is_none() {
            return Err(DataHubError::StoreError(format!("{} is not partitioned", schema.name)));
        }
        let table = self.table(schema.name)?;
        let mut rows = Vec::new();
        for row in table.rows.values() {
            if schema.partition_of(row)?.as_deref() == Some(partition) {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }

    fn upsert_batch(&mut self, schema: &'static TableSchema, batch: &UpsertBatch) -> Result<UpsertCounts> {
        let table = self
            .tables
            .get_mut(schema.name)
            .ok_or_else(|| DataHubError::StoreError(format!("Unknown table {}", schema.name)))?;

        let (writes, counts) = stage_batch(schema, &table.rows, batch)?;
        table.rows.extend(writes);
        Ok(counts)
    }
}
