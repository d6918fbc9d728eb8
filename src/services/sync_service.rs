use crate::config::Config;
use crate::errors::{DataHubError, Result};
use crate::models::company::{CompanyRecord, COMPANY_INFO};
use crate::models::daily_price::DAILY_PRICE;
use crate::scrapers::base::{ListingSource, PriceSource};
use crate::services::change_gate::needs_refresh;
use crate::services::normalizer::{normalize_listing, normalize_price_table};
use crate::services::page_aggregator::fetch_all_pages;
use crate::services::upsert::upsert;
use crate::store::{load_records, ScalarQuery, Store, UpsertCounts};
use crate::util;
use chrono::NaiveDate;
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;

/// Result of one directory pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryOutcome {
    /// The store was already refreshed on or after today; nothing was fetched.
    UpToDate { watermark: NaiveDate },
    /// Nothing usable was fetched; the store was not touched.
    Aborted { reason: String },
    /// The batch failed at the store and was rolled back.
    RolledBack { reason: String },
    Updated { counts: UpsertCounts, dropped: usize },
}

/// Why one company was skipped by the price pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Fetch(String),
    EmptyResult,
    NoUsableRows,
    Store(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(e) => write!(f, "fetch failed: {}", e),
            SkipReason::EmptyResult => write!(f, "no data returned"),
            SkipReason::NoUsableRows => write!(f, "no usable rows after normalization"),
            SkipReason::Store(e) => write!(f, "store rejected batch: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    pub code: String,
    pub name: String,
    pub reason: SkipReason,
}

/// Totals of one price pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSyncSummary {
    pub entities: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedEntity>,
    pub counts: UpsertCounts,
}

/// Runs the directory and daily price pipelines against one store.
pub struct SyncService<S: Store> {
    config: Config,
    store: S,
    listing_source: Arc<dyn ListingSource + Send + Sync>,
    price_source: Arc<dyn PriceSource + Send + Sync>,
}

impl<S: Store> SyncService<S> {
    /// Creates the service and makes sure both tables exist.
    pub fn new(
        config: Config,
        mut store: S,
        listing_source: Arc<dyn ListingSource + Send + Sync>,
        price_source: Arc<dyn PriceSource + Send + Sync>,
    ) -> Result<Self> {
        store.create_schema_if_absent(&COMPANY_INFO)?;
        store.create_schema_if_absent(&DAILY_PRICE)?;
        Ok(Self {
            config,
            store,
            listing_source,
            price_source,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// `MAX(last_refreshed)` of the directory, `None` when it is empty.
    pub fn directory_watermark(&self) -> Result<Option<NaiveDate>> {
        let value = self.store.read_scalar(&ScalarQuery::Max {
            table: COMPANY_INFO.name,
            column: "last_refreshed",
        })?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_date()
            .map(Some)
            .ok_or_else(|| DataHubError::StoreError(format!("last_refreshed is not a date: {:?}", value)))
    }

    /// Directory pipeline. Only failing to read the watermark is returned as an error.
    pub async fn sync_directory(&mut self, today: NaiveDate) -> Result<DirectoryOutcome> {
        let watermark = self.directory_watermark()?;
        if !needs_refresh(watermark, today) {
            info!("Company info is already up-to-date as of {}. No update needed.", today);
            return Ok(DirectoryOutcome::UpToDate {
                watermark: watermark.unwrap_or(today),
            });
        }

        info!(
            "Starting company information update from {}...",
            self.listing_source.source_name()
        );
        let table = match self.listing_source.fetch_listing(&today).await {
            Ok(table) => table,
            Err(e) => {
                error!("Failed to fetch stock listing: {}", e);
                return Ok(DirectoryOutcome::Aborted { reason: e.to_string() });
            }
        };
        if table.is_empty() {
            warn!("No listing data to process. Aborting update.");
            return Ok(DirectoryOutcome::Aborted {
                reason: "empty listing".to_string(),
            });
        }

        let mut records = normalize_listing(&table, today);
        let dropped = table.len() - records.len();
        if records.is_empty() {
            warn!("All {} listing rows were rejected. Aborting update.", table.len());
            return Ok(DirectoryOutcome::Aborted {
                reason: "no valid listing rows".to_string(),
            });
        }
        if self.config.debug_mode {
            util::limit_entities(&mut records, self.config.debug_stock_limit);
        }

        match upsert(&mut self.store, &records) {
            Ok(counts) => {
                info!(
                    "Company information update complete: {} new companies inserted, {} existing companies updated, {} rows dropped.",
                    counts.inserted, counts.updated, dropped
                );
                Ok(DirectoryOutcome::Updated { counts, dropped })
            }
            Err(e) => {
                error!("Store error during company info update, batch rolled back: {}", e);
                Ok(DirectoryOutcome::RolledBack { reason: e.to_string() })
            }
        }
    }

    /// `(code, name)` of every listed company, ordered by code.
    pub fn load_universe(&self) -> Result<Vec<(String, String)>> {
        let mut universe: Vec<(String, String)> = load_records::<CompanyRecord, _>(&self.store)?
            .into_iter()
            .map(|c| (c.code, c.name))
            .collect();
        universe.sort();
        Ok(universe)
    }

    /// Price pipeline over the whole directory.
    pub async fn sync_prices(&mut self) -> Result<PriceSyncSummary> {
        self.sync_prices_for(&[]).await
    }

    /// Price pipeline restricted to `codes` (all companies when empty).
    ///
    /// Each company is its own unit of work; a failing company is logged and
    /// skipped. Only failing to load the universe is returned as an error.
    pub async fn sync_prices_for(&mut self, codes: &[String]) -> Result<PriceSyncSummary> {
        info!("Starting daily price update process...");

        let mut universe = self.load_universe()?;
        if universe.is_empty() {
            warn!("No company information found in 'company_info'. Aborting daily price update.");
            return Ok(PriceSyncSummary::default());
        }
        if !codes.is_empty() {
            for code in codes {
                if !universe.iter().any(|(c, _)| c == code) {
                    warn!("{} is not in company_info, skipping", code);
                }
            }
            universe.retain(|(c, _)| codes.contains(c));
        }
        if self.config.debug_mode {
            util::limit_entities(&mut universe, self.config.debug_stock_limit);
        }

        let page_cap = self.config.pages_to_fetch;
        info!("Loaded {} company codes, page cap {}", universe.len(), page_cap);

        let mut summary = PriceSyncSummary {
            entities: universe.len(),
            ..Default::default()
        };
        for (i, (code, name)) in universe.iter().enumerate() {
            info!("Processing ({}/{}): {} ({})", i + 1, universe.len(), name, code);
            match self.sync_entity(code, page_cap).await {
                Ok(counts) => {
                    info!(
                        "Successfully upserted {} daily prices for {} ({}): {} new, {} updated",
                        counts.total(),
                        name,
                        code,
                        counts.inserted,
                        counts.updated
                    );
                    summary.succeeded += 1;
                    summary.counts += counts;
                }
                Err(reason) => {
                    warn!("Skipping daily price update for {} ({}): {}", name, code, reason);
                    summary.skipped.push(SkippedEntity {
                        code: code.clone(),
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Daily price update process completed: {} succeeded, {} skipped, {} inserted, {} updated.",
            summary.succeeded,
            summary.skipped.len(),
            summary.counts.inserted,
            summary.counts.updated
        );
        Ok(summary)
    }

    async fn sync_entity(&mut self, code: &str, page_cap: u32) -> std::result::Result<UpsertCounts, SkipReason> {
        let source = Arc::clone(&self.price_source);
        let pages = fetch_all_pages(source.as_ref(), code, page_cap)
            .await
            .map_err(|e| SkipReason::Fetch(e.to_string()))?;
        if pages.table.is_empty() {
            return Err(SkipReason::EmptyResult);
        }

        let records = normalize_price_table(pages.table, code);
        if records.is_empty() {
            return Err(SkipReason::NoUsableRows);
        }

        upsert(&mut self.store, &records).map_err(|e| SkipReason::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::raw::RawTable;
    use crate::models::schema::{FieldValue, Row, TableSchema};
    use crate::scrapers::base::PricePage;
    use crate::store::{MemoryStore, UpsertBatch};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LISTING_COLUMNS: &[&str] = &[
        "Code", "ISU_CD", "Name", "Market", "Dept", "Close", "ChangeCode", "Changes", "ChagesRatio",
        "Open", "High", "Low", "Volume", "Amount", "Marcap", "Stocks", "MarketId",
    ];
    const PRICE_COLUMNS: &[&str] = &["날짜", "종가", "전일비", "시가", "고가", "저가", "거래량"];

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn listing_row(code: &str, name: &str) -> Vec<String> {
        [
            code, "KR7000000000", name, "KOSPI", "", "70,000", "1", "500", "0.72", "69,500", "70,200",
            "69,300", "10,000", "700,000", "417,000,000", "5,969", "STK",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    fn listing(rows: Vec<Vec<String>>) -> RawTable {
        RawTable::with_rows(LISTING_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn price_page(days: &[u32]) -> RawTable {
        let rows = days
            .iter()
            .map(|d| {
                vec![
                    format!("2025.05.{:02}", d),
                    "70,000".to_string(),
                    "▲500".to_string(),
                    "69,500".to_string(),
                    "70,200".to_string(),
                    "69,300".to_string(),
                    "1,000".to_string(),
                ]
            })
            .collect();
        RawTable::with_rows(PRICE_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
    }

    struct FakeListing {
        table: std::result::Result<RawTable, String>,
        calls: AtomicUsize,
    }

    impl FakeListing {
        fn new(table: std::result::Result<RawTable, String>) -> Arc<Self> {
            Arc::new(Self {
                table,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ListingSource for FakeListing {
        fn source_name(&self) -> &'static str {
            "fake listing"
        }

        async fn fetch_listing(&self, _date: &NaiveDate) -> Result<RawTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table.clone().map_err(DataHubError::FetchError)
        }
    }

    #[derive(Default)]
    struct FakePrices {
        pages: HashMap<String, Vec<RawTable>>,
        failing: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakePrices {
        fn with(mut self, code: &str, pages: Vec<RawTable>) -> Self {
            self.pages.insert(code.to_string(), pages);
            self
        }

        fn failing(mut self, code: &str) -> Self {
            self.failing.insert(code.to_string());
            self
        }
    }

    #[async_trait]
    impl PriceSource for FakePrices {
        fn source_name(&self) -> &'static str {
            "fake prices"
        }

        async fn fetch_page(&self, code: &str, page: u32) -> Result<PricePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(code) {
                return Err(DataHubError::FetchError(format!("{} unreachable", code)));
            }
            let pages = self.pages.get(code).cloned().unwrap_or_default();
            Ok(PricePage {
                table: pages.get(page as usize - 1).cloned().unwrap_or_default(),
                last_page: Some(pages.len().max(1) as u32),
            })
        }
    }

    /// Which commits a [`RejectingStore`] refuses.
    enum Rejection {
        All,
        Partition(&'static str),
    }

    /// Memory store that refuses some commits.
    struct RejectingStore {
        inner: MemoryStore,
        reject: Rejection,
    }

    impl RejectingStore {
        fn rejects(&self, schema: &TableSchema, batch: &UpsertBatch) -> bool {
            match self.reject {
                Rejection::All => true,
                Rejection::Partition(code) => batch
                    .inserts
                    .iter()
                    .chain(&batch.updates)
                    .any(|row| schema.partition_of(row).ok().flatten().as_deref() == Some(code)),
            }
        }
    }

    impl Store for RejectingStore {
        fn create_schema_if_absent(&mut self, schema: &'static TableSchema) -> Result<()> {
            self.inner.create_schema_if_absent(schema)
        }

        fn read_scalar(&self, query: &ScalarQuery) -> Result<FieldValue> {
            self.inner.read_scalar(query)
        }

        fn load_all(&self, schema: &'static TableSchema) -> Result<Vec<Row>> {
            self.inner.load_all(schema)
        }

        fn load_partition(&self, schema: &'static TableSchema, partition: &str) -> Result<Vec<Row>> {
            self.inner.load_partition(schema, partition)
        }

        fn upsert_batch(&mut self, schema: &'static TableSchema, batch: &UpsertBatch) -> Result<UpsertCounts> {
            if self.rejects(schema, batch) {
                return Err(DataHubError::StoreError("disk full".to_string()));
            }
            self.inner.upsert_batch(schema, batch)
        }
    }

    fn service<S: Store>(
        store: S,
        listing: Arc<FakeListing>,
        prices: Arc<FakePrices>,
    ) -> SyncService<S> {
        SyncService::new(Config::new(), store, listing, prices).unwrap()
    }

    fn three_companies() -> RawTable {
        listing(vec![
            listing_row("005930", "삼성전자"),
            listing_row("000660", "SK하이닉스"),
            listing_row("035720", "카카오"),
        ])
    }

    #[tokio::test]
    async fn directory_refresh_then_gate_skips_same_day() {
        let listing = FakeListing::new(Ok(three_companies()));
        let mut svc = service(MemoryStore::new(), listing.clone(), Arc::new(FakePrices::default()));

        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::Updated {
                counts: UpsertCounts { inserted: 3, updated: 0 },
                dropped: 0
            }
        );
        assert_eq!(svc.directory_watermark().unwrap(), Some(day(2)));

        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert_eq!(outcome, DirectoryOutcome::UpToDate { watermark: day(2) });
        assert_eq!(listing.calls.load(Ordering::SeqCst), 1);

        let outcome = svc.sync_directory(day(3)).await.unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::Updated {
                counts: UpsertCounts { inserted: 0, updated: 3 },
                dropped: 0
            }
        );
        assert_eq!(svc.store().row_count("company_info"), 3);
    }

    #[tokio::test]
    async fn directory_fetch_failure_or_empty_listing_leaves_store_untouched() {
        let mut svc = service(
            MemoryStore::new(),
            FakeListing::new(Err("connection reset".to_string())),
            Arc::new(FakePrices::default()),
        );
        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert!(matches!(outcome, DirectoryOutcome::Aborted { .. }));
        assert_eq!(svc.store().row_count("company_info"), 0);

        let mut svc = service(
            MemoryStore::new(),
            FakeListing::new(Ok(listing(Vec::new()))),
            Arc::new(FakePrices::default()),
        );
        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert!(matches!(outcome, DirectoryOutcome::Aborted { .. }));
        assert_eq!(svc.directory_watermark().unwrap(), None);
    }

    #[tokio::test]
    async fn directory_drops_bad_rows_and_keeps_the_rest() {
        let table = listing(vec![
            listing_row("005930", "삼성전자"),
            listing_row("", "이름없음"),
            listing_row("005930", "삼성전자우"),
        ]);
        let mut svc = service(MemoryStore::new(), FakeListing::new(Ok(table)), Arc::new(FakePrices::default()));
        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert_eq!(
            outcome,
            DirectoryOutcome::Updated {
                counts: UpsertCounts { inserted: 1, updated: 0 },
                dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn directory_store_failure_rolls_back() {
        let store = RejectingStore {
            inner: MemoryStore::new(),
            reject: Rejection::All,
        };
        let mut svc = service(store, FakeListing::new(Ok(three_companies())), Arc::new(FakePrices::default()));
        let outcome = svc.sync_directory(day(2)).await.unwrap();
        assert!(matches!(outcome, DirectoryOutcome::RolledBack { .. }));
        assert_eq!(svc.store().inner.row_count("company_info"), 0);
    }

    #[tokio::test]
    async fn price_sync_isolates_failing_company() {
        let prices = FakePrices::default()
            .with("005930", vec![price_page(&[30, 29]), price_page(&[28, 27])])
            .with("035720", vec![price_page(&[30])])
            .failing("000660");
        let mut svc = service(MemoryStore::new(), FakeListing::new(Ok(three_companies())), Arc::new(prices));
        svc.sync_directory(day(2)).await.unwrap();

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.entities, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].code, "000660");
        assert!(matches!(summary.skipped[0].reason, SkipReason::Fetch(_)));
        assert_eq!(summary.counts, UpsertCounts { inserted: 5, updated: 0 });
        assert_eq!(svc.store().row_count("daily_price"), 5);

        // second run only updates
        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.counts, UpsertCounts { inserted: 0, updated: 5 });
        assert_eq!(svc.store().row_count("daily_price"), 5);
    }

    #[tokio::test]
    async fn price_sync_skips_empty_history() {
        let prices = FakePrices::default().with("005930", vec![RawTable::default()]);
        let table = listing(vec![listing_row("005930", "삼성전자")]);
        let mut svc = service(MemoryStore::new(), FakeListing::new(Ok(table)), Arc::new(prices));
        svc.sync_directory(day(2)).await.unwrap();

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.skipped[0].reason, SkipReason::EmptyResult);
        assert_eq!(svc.store().row_count("daily_price"), 0);
    }

    #[tokio::test]
    async fn price_sync_skips_history_without_usable_rows() {
        let undated = |date: &str| {
            let mut row = vec![date.to_string()];
            row.extend(["1", "0", "1", "1", "1", "1"].iter().map(|c| c.to_string()));
            row
        };
        let garbage = RawTable::with_rows(
            PRICE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec![undated("날짜없음"), undated("2025.13.45")],
        );
        let prices = FakePrices::default()
            .with("005930", vec![garbage])
            .with("035720", vec![price_page(&[30])]);
        let table = listing(vec![listing_row("005930", "삼성전자"), listing_row("035720", "카카오")]);
        let mut svc = service(MemoryStore::new(), FakeListing::new(Ok(table)), Arc::new(prices));
        svc.sync_directory(day(2)).await.unwrap();

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].code, "005930");
        assert_eq!(summary.skipped[0].reason, SkipReason::NoUsableRows);
        assert_eq!(svc.store().row_count("daily_price"), 1);
    }

    #[tokio::test]
    async fn price_sync_keeps_other_batches_when_store_rejects_one() {
        let store = RejectingStore {
            inner: MemoryStore::new(),
            reject: Rejection::Partition("000660"),
        };
        let prices = FakePrices::default()
            .with("005930", vec![price_page(&[30, 29])])
            .with("000660", vec![price_page(&[30])])
            .with("035720", vec![price_page(&[30])]);
        let mut svc = service(store, FakeListing::new(Ok(three_companies())), Arc::new(prices));
        svc.sync_directory(day(2)).await.unwrap();
        assert_eq!(svc.store().inner.row_count("company_info"), 3);

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].code, "000660");
        assert!(matches!(summary.skipped[0].reason, SkipReason::Store(_)));
        assert_eq!(summary.counts, UpsertCounts { inserted: 3, updated: 0 });
        assert_eq!(svc.store().inner.row_count("daily_price"), 3);
    }

    #[tokio::test]
    async fn price_sync_respects_page_cap_and_code_filter() {
        let prices = Arc::new(
            FakePrices::default()
                .with("005930", vec![price_page(&[30, 29]), price_page(&[28, 27])])
                .with("035720", vec![price_page(&[30])]),
        );
        let mut svc = SyncService::new(
            Config::new().with_pages_to_fetch(1),
            MemoryStore::new(),
            FakeListing::new(Ok(three_companies())),
            prices.clone(),
        )
        .unwrap();
        svc.sync_directory(day(2)).await.unwrap();

        let summary = svc.sync_prices_for(&["005930".to_string()]).await.unwrap();
        assert_eq!(summary.entities, 1);
        assert_eq!(summary.counts.inserted, 2);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn price_sync_with_empty_directory_does_nothing() {
        let prices = Arc::new(FakePrices::default());
        let mut svc = service(MemoryStore::new(), FakeListing::new(Ok(listing(Vec::new()))), prices.clone());

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary, PriceSyncSummary::default());
        assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn debug_mode_limits_universe() {
        let mut svc = SyncService::new(
            Config::new().with_debug_mode(true).with_debug_stock_limit(1),
            MemoryStore::new(),
            FakeListing::new(Ok(three_companies())),
            Arc::new(FakePrices::default().with("000660", vec![price_page(&[30])])),
        )
        .unwrap();
        svc.sync_directory(day(2)).await.unwrap();
        assert_eq!(svc.store().row_count("company_info"), 1);

        let summary = svc.sync_prices().await.unwrap();
        assert_eq!(summary.entities, 1);
    }
}
