use crate::errors::Result;
use crate::models::company::{CompanyRecord, COMPANY_INFO};
use crate::models::daily_price::{DailyPriceRecord, DAILY_PRICE};
use crate::store::{load_partition_records, load_records, ScalarQuery, Store};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Read-only view over a synchronized store.
pub struct DataProvider<'a, S: Store + ?Sized> {
    store: &'a S,
    companies: Vec<CompanyRecord>,
    // 빠른 조회용 인덱스
    code_index: HashMap<String, usize>,
}

impl<'a, S: Store + ?Sized> DataProvider<'a, S> {
    /// Loads the directory once; price series are read on demand.
    pub fn new(store: &'a S) -> Result<Self> {
        let companies: Vec<CompanyRecord> = load_records(store)?;
        let code_index = companies
            .iter()
            .enumerate()
            .map(|(i, c)| (c.code.clone(), i))
            .collect();
        Ok(Self {
            store,
            companies,
            code_index,
        })
    }

    pub fn get_all_companies(&self) -> &[CompanyRecord] {
        &self.companies
    }

    pub fn get_company(&self, code: &str) -> Option<&CompanyRecord> {
        self.code_index.get(code).map(|&idx| &self.companies[idx])
    }

    /// Companies whose market matches, e.g. `KOSPI`, `KOSDAQ`.
    pub fn get_companies_by_market(&self, market: &str) -> Vec<&CompanyRecord> {
        self.companies
            .iter()
            .filter(|c| c.market.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(market)))
            .collect()
    }

    /// Daily prices of `code`, newest first.
    pub fn get_daily_prices(&self, code: &str) -> Result<Vec<DailyPriceRecord>> {
        let mut prices: Vec<DailyPriceRecord> = load_partition_records(self.store, code)?;
        prices.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(prices)
    }

    /// Most recent trading date stored for any company.
    pub fn get_latest_trading_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .store
            .read_scalar(&ScalarQuery::Max {
                table: DAILY_PRICE.name,
                column: "date",
            })?
            .as_date())
    }

    /// Date of the last directory refresh.
    pub fn get_directory_watermark(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .store
            .read_scalar(&ScalarQuery::Max {
                table: COMPANY_INFO.name,
                column: "last_refreshed",
            })?
            .as_date())
    }
}
