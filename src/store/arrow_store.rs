use crate::errors::{DataHubError, Result};
use crate::models::schema::{FieldValue, Row, RowKey, TableSchema};
use crate::store::{eval_scalar, stage_batch, ScalarQuery, Store, UpsertBatch, UpsertCounts};
use crate::util::arrow_utils;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Arrow IPC file store.
///
/// Unpartitioned tables live in `<root>/<table>.arrow`; partitioned tables get one
/// file per partition value under `<root>/<table>/`. A batch is committed by
/// writing an `*.arrow.tmp` sibling and renaming it over the live file, so a
/// batch of a partitioned table must stay within one partition.
pub struct ArrowStore {
    root: PathBuf,
    tables: HashMap<&'static str, &'static TableSchema>,
}

impl ArrowStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }
        Ok(Self {
            root,
            tables: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn registered(&self, name: &str) -> Result<&'static TableSchema> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| DataHubError::StoreError(format!("Unknown table {}", name)))
    }

    fn table_file(&self, schema: &TableSchema) -> PathBuf {
        self.root.join(format!("{}.arrow", schema.name))
    }

    fn partition_dir(&self, schema: &TableSchema) -> PathBuf {
        self.root.join(schema.name)
    }

    fn partition_file(&self, schema: &TableSchema, partition: &str) -> Result<PathBuf> {
        let safe = !partition.is_empty()
            && partition
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(DataHubError::StoreError(format!(
                "{}: partition value {:?} is not a valid file name",
                schema.name, partition
            )));
        }
        Ok(self.partition_dir(schema).join(format!("{}.arrow", partition)))
    }

    fn read_file(schema: &TableSchema, path: &Path) -> Result<Vec<Row>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        arrow_utils::read_rows_from_arrow(schema, path)
    }

    fn partition_files(&self, schema: &TableSchema) -> Result<Vec<PathBuf>> {
        let dir = self.partition_dir(schema);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("arrow") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn check_file_schema(schema: &TableSchema, path: &Path) -> Result<()> {
        let stored = arrow_utils::read_field_names(path)?;
        let expected = schema.field_names();
        if stored.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(DataHubError::StoreError(format!(
                "{} has columns {:?}, expected {:?}",
                path.display(),
                stored,
                expected
            )));
        }
        Ok(())
    }

    fn target_file(&self, schema: &TableSchema, partition: Option<&str>) -> Result<PathBuf> {
        match partition {
            Some(p) => self.partition_file(schema, p),
            None => Ok(self.table_file(schema)),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("arrow.tmp")
}

impl Store for ArrowStore {
    fn create_schema_if_absent(&mut self, schema: &'static TableSchema) -> Result<()> {
        if schema.partition_key.is_some() {
            let dir = self.partition_dir(schema);
            if !dir.exists() {
                info!("Creating table directory {}", dir.display());
                fs::create_dir_all(&dir)?;
            }
            if let Some(first) = self.partition_files(schema)?.first() {
                Self::check_file_schema(schema, first)?;
            }
        } else {
            let path = self.table_file(schema);
            if path.exists() {
                Self::check_file_schema(schema, &path)?;
            } else {
                info!("Creating empty table {}", path.display());
                arrow_utils::save_rows_to_arrow(schema, &[], &path)?;
            }
        }
        self.tables.insert(schema.name, schema);
        Ok(())
    }

    fn read_scalar(&self, query: &ScalarQuery) -> Result<FieldValue> {
        let schema = self.registered(query.table())?;
        let rows = self.load_all(schema)?;
        eval_scalar(schema, rows.iter(), query)
    }

    fn load_all(&self, schema: &'static TableSchema) -> Result<Vec<Row>> {
        self.registered(schema.name)?;
        if schema.partition_key.is_none() {
            return Self::read_file(schema, &self.table_file(schema));
        }
        let mut rows = Vec::new();
        for path in self.partition_files(schema)? {
            rows.extend(Self::read_file(schema, &path)?);
        }
        Ok(rows)
    }

    fn load_partition(&self, schema: &'static TableSchema, partition: &str) -> Result<Vec<Row>> {
        self.registered(schema.name)?;
        if schema.partition_key.is_none() {
            return Err(DataHubError::StoreError(format!("{} is not partitioned", schema.name)));
        }
        Self::read_file(schema, &self.partition_file(schema, partition)?)
    }

    fn upsert_batch(&mut self, schema: &'static TableSchema, batch: &UpsertBatch) -> Result<UpsertCounts> {
        self.registered(schema.name)?;

        // 파티션별로 분류
        let mut grouped: BTreeMap<Option<String>, UpsertBatch> = BTreeMap::new();
        for row in &batch.inserts {
            grouped.entry(schema.partition_of(row)?).or_default().inserts.push(row.clone());
        }
        for row in &batch.updates {
            grouped.entry(schema.partition_of(row)?).or_default().updates.push(row.clone());
        }

        // One file per batch keeps the rename commit atomic.
        if grouped.len() > 1 {
            return Err(DataHubError::StoreError(format!(
                "{}: batch spans {} partitions, commit them one at a time",
                schema.name,
                grouped.len()
            )));
        }

        // Stage before touching disk.
        let mut pending = Vec::with_capacity(grouped.len());
        let mut counts = UpsertCounts::default();
        for (partition, sub_batch) in &grouped {
            let path = self.target_file(schema, partition.as_deref())?;
            let mut current: BTreeMap<RowKey, Row> = BTreeMap::new();
            for row in Self::read_file(schema, &path)? {
                current.insert(schema.key_of(&row)?, row);
            }
            let (writes, sub_counts) = stage_batch(schema, &current, sub_batch)?;
            current.extend(writes);
            counts += sub_counts;
            pending.push((path, current.into_values().collect::<Vec<_>>()));
        }

        let mut written: Vec<PathBuf> = Vec::with_capacity(pending.len());
        for (path, rows) in &pending {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = tmp_path(path);
            if let Err(e) = arrow_utils::save_rows_to_arrow(schema, rows, &tmp) {
                warn!("Rolling back {} batch: {}", schema.name, e);
                for done in written.iter().chain(std::iter::once(&tmp)) {
                    let _ = fs::remove_file(done);
                }
                return Err(e);
            }
            written.push(tmp);
        }

        for (path, _) in &pending {
            fs::rename(tmp_path(path), path).map_err(|e| {
                DataHubError::StoreError(format!("Failed to commit {}: {}", path.display(), e))
            })?;
        }

        debug!(
            "Committed {} batch: {} inserted, {} updated across {} file(s)",
            schema.name,
            counts.inserted,
            counts.updated,
            pending.len()
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::company::{sample_company, CompanyRecord, COMPANY_INFO};
    use crate::models::daily_price::{DailyPriceRecord, DAILY_PRICE};
    use crate::models::schema::StoredRecord;
    use crate::store::{load_partition_records, load_records};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn price(code: &str, day: u32, close: i64) -> DailyPriceRecord {
        DailyPriceRecord {
            code: code.into(),
            date: NaiveDate::from_ymd_opt(2025, 5, day).unwrap(),
            open: close - 10,
            high: close + 20,
            low: close - 30,
            close,
            diff: 10,
            volume: 1_000,
        }
    }

    fn open_store(dir: &Path) -> ArrowStore {
        let mut store = ArrowStore::open(dir).unwrap();
        store.create_schema_if_absent(&COMPANY_INFO).unwrap();
        store.create_schema_if_absent(&DAILY_PRICE).unwrap();
        store
    }

    #[test]
    fn companies_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let company = sample_company("005930", "삼성전자", today());
        {
            let mut store = open_store(dir.path());
            let batch = UpsertBatch { inserts: vec![company.to_row()], updates: vec![] };
            store.upsert_batch(&COMPANY_INFO, &batch).unwrap();
        }

        let store = open_store(dir.path());
        let loaded: Vec<CompanyRecord> = load_records(&store).unwrap();
        assert_eq!(loaded, vec![company]);
        assert_eq!(
            store
                .read_scalar(&ScalarQuery::Max { table: "company_info", column: "last_refreshed" })
                .unwrap(),
            FieldValue::Date(today())
        );
    }

    #[test]
    fn prices_are_written_per_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let batch = UpsertBatch {
            inserts: vec![price("005930", 2, 100).to_row(), price("005930", 3, 110).to_row()],
            updates: vec![],
        };
        store.upsert_batch(&DAILY_PRICE, &batch).unwrap();

        assert!(dir.path().join("daily_price").join("005930.arrow").exists());
        let loaded: Vec<DailyPriceRecord> = load_partition_records(&store, "005930").unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(load_partition_records::<DailyPriceRecord, _>(&store, "000660").unwrap().is_empty());
    }

    #[test]
    fn rejected_batch_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let first = UpsertBatch { inserts: vec![price("005930", 2, 100).to_row()], updates: vec![] };
        store.upsert_batch(&DAILY_PRICE, &first).unwrap();

        let mut broken = price("005930", 4, 130).to_row();
        broken[2] = FieldValue::Null;
        let second = UpsertBatch {
            inserts: vec![price("005930", 3, 110).to_row(), broken],
            updates: vec![price("005930", 2, 999).to_row()],
        };
        assert!(store.upsert_batch(&DAILY_PRICE, &second).is_err());

        let loaded: Vec<DailyPriceRecord> = load_partition_records(&store, "005930").unwrap();
        assert_eq!(loaded, vec![price("005930", 2, 100)]);
        assert!(!dir.path().join("daily_price").join("005930.arrow.tmp").exists());
    }

    #[test]
    fn batch_spanning_partitions_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let batch = UpsertBatch {
            inserts: vec![price("005930", 2, 100).to_row(), price("000660", 2, 200).to_row()],
            updates: vec![],
        };
        assert!(store.upsert_batch(&DAILY_PRICE, &batch).is_err());

        let partition_dir = dir.path().join("daily_price");
        assert!(!partition_dir.join("005930.arrow").exists());
        assert!(!partition_dir.join("000660.arrow").exists());
        assert_eq!(fs::read_dir(&partition_dir).unwrap().count(), 0);
    }

    #[test]
    fn incompatible_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        arrow_utils::save_rows_to_arrow(&DAILY_PRICE, &[], &dir.path().join("company_info.arrow")).unwrap();

        let mut store = ArrowStore::open(dir.path()).unwrap();
        assert!(store.create_schema_if_absent(&COMPANY_INFO).is_err());
    }

    #[test]
    fn partition_values_must_be_plain_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.load_partition(&DAILY_PRICE, "../etc").is_err());
    }
}
