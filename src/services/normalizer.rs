//! Raw upstream rows → typed records.
//!
//! Listing rows that fail validation are dropped with a warning. Price rows are
//! repaired where possible (unparsable numbers read as 0) and dropped only when
//! the date or a required cell is missing.

use crate::errors::{DataHubError, Result};
use crate::models::company::CompanyRecord;
use crate::models::daily_price::DailyPriceRecord;
use crate::models::raw::{RawRecord, RawTable};
use crate::models::schema::StoredRecord;
use crate::util::{extract_magnitude, parse_grouped_float, parse_grouped_int, parse_locale_date};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::HashSet;

/// Daily price page header → canonical column.
pub const PRICE_COLUMN_LABELS: &[(&str, &str)] = &[
    ("날짜", "date"),
    ("종가", "close"),
    ("전일비", "diff"),
    ("시가", "open"),
    ("고가", "high"),
    ("저가", "low"),
    ("거래량", "volume"),
];

/// KRX prints `-` for fields of issues that did not trade.
const NO_TRADE_PLACEHOLDER: &str = "-";

fn required_text(raw: &RawRecord<'_>, label: &str) -> Result<String> {
    raw.get(label)
        .map(str::to_string)
        .ok_or_else(|| DataHubError::ValidationError(format!("missing {}", label)))
}

fn optional_text(raw: &RawRecord<'_>, label: &str) -> Option<String> {
    raw.get(label).map(str::to_string)
}

fn required_int(raw: &RawRecord<'_>, label: &str) -> Result<i64> {
    match raw.get(label) {
        None => Err(DataHubError::ValidationError(format!("missing {}", label))),
        Some(NO_TRADE_PLACEHOLDER) => Ok(0),
        Some(text) => parse_grouped_int(text)
            .ok_or_else(|| DataHubError::ValidationError(format!("{} is not a number: {:?}", label, text))),
    }
}

fn required_float(raw: &RawRecord<'_>, label: &str) -> Result<f64> {
    match raw.get(label) {
        None => Err(DataHubError::ValidationError(format!("missing {}", label))),
        Some(NO_TRADE_PLACEHOLDER) => Ok(0.0),
        Some(text) => parse_grouped_float(text)
            .ok_or_else(|| DataHubError::ValidationError(format!("{} is not a number: {:?}", label, text))),
    }
}

/// Builds a [`CompanyRecord`] from one labelled listing row, stamped with `today`.
pub fn normalize_listing_row(raw: &RawRecord<'_>, today: NaiveDate) -> Result<CompanyRecord> {
    let record = CompanyRecord {
        code: required_text(raw, "Code")?,
        isu_cd: optional_text(raw, "ISU_CD"),
        name: required_text(raw, "Name")?,
        market: optional_text(raw, "Market"),
        dept: optional_text(raw, "Dept"),
        close: required_int(raw, "Close")?,
        change_code: optional_text(raw, "ChangeCode"),
        changes: required_int(raw, "Changes")?,
        changes_ratio: required_float(raw, "ChagesRatio")?,
        open: required_int(raw, "Open")?,
        high: required_int(raw, "High")?,
        low: required_int(raw, "Low")?,
        volume: required_int(raw, "Volume")?,
        amount: required_int(raw, "Amount")?,
        marcap: required_int(raw, "Marcap")?,
        stocks: required_int(raw, "Stocks")?,
        market_id: optional_text(raw, "MarketId"),
        last_refreshed: today,
    };

    // 저장 스키마 제약(길이 등)도 여기서 확인해 배치 전체가 실패하지 않게 함
    CompanyRecord::schema()
        .validate(&record.to_row())
        .map_err(|e| DataHubError::ValidationError(e.to_string()))?;
    Ok(record)
}

/// Normalizes a whole listing; codes are unique in the result (first row wins).
pub fn normalize_listing(table: &RawTable, today: NaiveDate) -> Vec<CompanyRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(table.len());

    for (idx, raw) in table.records().enumerate() {
        match normalize_listing_row(&raw, today) {
            Ok(record) => {
                if seen.insert(record.code.clone()) {
                    records.push(record);
                } else {
                    warn!("Dropping duplicate listing row {} for code {}", idx, record.code);
                }
            }
            Err(e) => warn!("Dropping listing row {} ({:?}): {}", idx, raw.get("Code"), e),
        }
    }

    records
}

/// Normalizes the concatenated price pages of one company, keeping page order.
pub fn normalize_price_table(mut raw_table: RawTable, code: &str) -> Vec<DailyPriceRecord> {
    raw_table.rename_columns(PRICE_COLUMN_LABELS);

    let mut seen_dates = HashSet::new();
    let mut records = Vec::with_capacity(raw_table.len());
    let mut dropped = 0usize;

    for raw in raw_table.records() {
        let Some(date) = raw.get("date").and_then(parse_locale_date) else {
            dropped += 1;
            continue;
        };

        // Present but unparsable cells become 0; absent cells drop the row.
        let number = |label: &str| raw.get(label).map(|t| parse_grouped_int(t).unwrap_or(0));
        let diff = raw.get("diff").map(|t| extract_magnitude(t).unwrap_or(0));

        let (Some(open), Some(high), Some(low), Some(close), Some(diff), Some(volume)) = (
            number("open"),
            number("high"),
            number("low"),
            number("close"),
            diff,
            number("volume"),
        ) else {
            dropped += 1;
            continue;
        };

        if !seen_dates.insert(date) {
            debug!("{}: {} appears on more than one page, keeping the first", code, date);
            continue;
        }

        let record = DailyPriceRecord {
            code: code.to_string(),
            date,
            open,
            high,
            low,
            close,
            diff,
            volume,
        };
        if let Err(e) = DailyPriceRecord::schema().validate(&record.to_row()) {
            warn!("Dropping {} {}: {}", code, date, e);
            dropped += 1;
            continue;
        }
        records.push(record);
    }

    if dropped > 0 {
        debug!("{}: dropped {} incomplete price rows", code, dropped);
    }
    records
}
