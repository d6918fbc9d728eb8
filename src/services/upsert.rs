use crate::errors::Result;
use crate::models::schema::{Row, RowKey, StoredRecord};
use crate::store::{Store, UpsertBatch, UpsertCounts};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Splits rows into inserts and updates against a snapshot of existing keys.
///
/// A key repeated within `rows` is written once, with its last row.
pub fn plan_batch<F>(rows: Vec<Row>, existing: &HashSet<RowKey>, key_fn: F) -> Result<UpsertBatch>
where
    F: Fn(&Row) -> Result<RowKey>,
{
    let mut batch = UpsertBatch::default();
    let mut slots: HashMap<RowKey, (bool, usize)> = HashMap::new();

    for row in rows {
        let key = key_fn(&row)?;
        if let Some(&(is_insert, idx)) = slots.get(&key) {
            let target = if is_insert { &mut batch.inserts } else { &mut batch.updates };
            target[idx] = row;
            continue;
        }
        if existing.contains(&key) {
            slots.insert(key, (false, batch.updates.len()));
            batch.updates.push(row);
        } else {
            slots.insert(key, (true, batch.inserts.len()));
            batch.inserts.push(row);
        }
    }

    Ok(batch)
}

/// Writes `records` as one unit of work.
///
/// Existing keys are read once before classification (scoped to the partition
/// when every record shares one); the store then applies the whole batch or
/// nothing. Assumes no other writer touches the same keys meanwhile.
pub fn upsert<R, S>(store: &mut S, records: &[R]) -> Result<UpsertCounts>
where
    R: StoredRecord,
    S: Store + ?Sized,
{
    if records.is_empty() {
        return Ok(UpsertCounts::default());
    }
    let schema = R::schema();
    let rows: Vec<Row> = records.iter().map(R::to_row).collect();

    let mut partitions = HashSet::new();
    for row in &rows {
        partitions.insert(schema.partition_of(row)?);
    }
    let scope = match (partitions.len(), partitions.iter().next()) {
        (1, Some(Some(partition))) => Some(partition.as_str()),
        _ => None,
    };

    let existing = store.load_keys(schema, scope)?;
    let batch = plan_batch(rows, &existing, |row| schema.key_of(row))?;
    debug!(
        "{}: {} inserts, {} updates planned against {} existing keys",
        schema.name,
        batch.inserts.len(),
        batch.updates.len(),
        existing.len()
    );

    store.upsert_batch(schema, &batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::company::{sample_company, CompanyRecord, COMPANY_INFO};
    use crate::models::daily_price::{DailyPriceRecord, DAILY_PRICE};
    use crate::store::{load_records, MemoryStore};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn store_with_companies(codes: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_schema_if_absent(&COMPANY_INFO).unwrap();
        store.create_schema_if_absent(&DAILY_PRICE).unwrap();
        let seeded: Vec<_> = codes.iter().map(|c| sample_company(c, "기존", today())).collect();
        upsert(&mut store, &seeded).unwrap();
        store
    }

    #[test]
    fn plan_splits_on_snapshot() {
        let existing: HashSet<RowKey> = [RowKey::single("005930")].into_iter().collect();
        let rows = vec![
            sample_company("005930", "삼성전자", today()).to_row(),
            sample_company("000660", "SK하이닉스", today()).to_row(),
        ];

        let batch = plan_batch(rows, &existing, |row| COMPANY_INFO.key_of(row)).unwrap();
        assert_eq!(batch.inserts.len(), 1);
        assert_eq!(batch.updates.len(), 1);
    }

    #[test]
    fn plan_collapses_repeated_keys() {
        let rows = vec![
            sample_company("005930", "첫번째", today()).to_row(),
            sample_company("005930", "두번째", today()).to_row(),
        ];
        let batch = plan_batch(rows, &HashSet::new(), |row| COMPANY_INFO.key_of(row)).unwrap();
        assert_eq!(batch.inserts.len(), 1);
        assert_eq!(CompanyRecord::from_row(&batch.inserts[0]).unwrap().name, "두번째");
    }

    #[test]
    fn upsert_counts_inserts_and_updates() {
        let mut store = store_with_companies(&["005930"]);
        let incoming = vec![
            sample_company("005930", "삼성전자", today()),
            sample_company("000660", "SK하이닉스", today()),
        ];

        let counts = upsert(&mut store, &incoming).unwrap();
        assert_eq!(counts, UpsertCounts { inserted: 1, updated: 1 });

        let stored: Vec<CompanyRecord> = load_records(&store).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|c| c.name != "기존"));
    }

    #[test]
    fn failure_mid_batch_commits_nothing() {
        let mut store = store_with_companies(&[]);
        let mut broken = sample_company("035720", "카카오", today());
        broken.name = "가".repeat(80);
        let incoming = vec![
            sample_company("005930", "삼성전자", today()),
            broken,
            sample_company("000660", "SK하이닉스", today()),
        ];

        let err = upsert(&mut store, &incoming).unwrap_err();
        assert!(err.is_store_error());
        assert_eq!(store.row_count("company_info"), 0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut store = store_with_companies(&[]);
        let prices: Vec<DailyPriceRecord> = (1..=3)
            .map(|d| DailyPriceRecord {
                code: "005930".into(),
                date: NaiveDate::from_ymd_opt(2025, 5, d).unwrap(),
                open: 1,
                high: 2,
                low: 1,
                close: 2,
                diff: 1,
                volume: 100,
            })
            .collect();

        assert_eq!(upsert(&mut store, &prices).unwrap(), UpsertCounts { inserted: 3, updated: 0 });
        let first: Vec<DailyPriceRecord> = load_records(&store).unwrap();
        assert_eq!(upsert(&mut store, &prices).unwrap(), UpsertCounts { inserted: 0, updated: 3 });
        let second: Vec<DailyPriceRecord> = load_records(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let mut store = MemoryStore::new();
        let counts = upsert::<CompanyRecord, _>(&mut store, &[]).unwrap();
        assert_eq!(counts, UpsertCounts::default());
    }
}
