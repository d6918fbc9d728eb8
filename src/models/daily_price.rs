use crate::errors::Result;
use crate::models::schema::{FieldDef, Row, RowReader, StoredRecord, TableSchema};
use chrono::NaiveDate;

/// `daily_price`: one row per (code, date), stored per code.
pub static DAILY_PRICE: TableSchema = TableSchema {
    name: "daily_price",
    fields: &[
        FieldDef::text("code", 20).required(),
        FieldDef::date("date").required(),
        FieldDef::integer("open").required(),
        FieldDef::integer("high").required(),
        FieldDef::integer("low").required(),
        FieldDef::integer("close").required(),
        FieldDef::integer("diff").required(),
        FieldDef::integer("volume").required(),
    ],
    natural_key: &["code", "date"],
    partition_key: Some("code"),
};

/// 일별 시세. Prices are in whole won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPriceRecord {
    pub code: String,
    pub date: NaiveDate,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    /// Unsigned size of the change against the previous close.
    pub diff: i64,
    pub volume: i64,
}

impl StoredRecord for DailyPriceRecord {
    fn schema() -> &'static TableSchema {
        &DAILY_PRICE
    }

    fn to_row(&self) -> Row {
        vec![
            self.code.clone().into(),
            self.date.into(),
            self.open.into(),
            self.high.into(),
            self.low.into(),
            self.close.into(),
            self.diff.into(),
            self.volume.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new(&DAILY_PRICE, row);
        Ok(Self {
            code: r.text("code")?,
            date: r.date("date")?,
            open: r.integer("open")?,
            high: r.integer("high")?,
            low: r.integer("low")?,
            close: r.integer("close")?,
            diff: r.integer("diff")?,
            volume: r.integer("volume")?,
        })
    }
}
