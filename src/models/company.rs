use crate::errors::Result;
use crate::models::schema::{FieldDef, Row, RowReader, StoredRecord, TableSchema};
use chrono::NaiveDate;

/// `company_info`: one row per exchange code.
pub static COMPANY_INFO: TableSchema = TableSchema {
    name: "company_info",
    fields: &[
        FieldDef::text("code", 20).required(),
        FieldDef::text("isu_cd", 30),
        FieldDef::text("name", 50).required(),
        FieldDef::text("market", 20),
        FieldDef::text("dept", 30),
        FieldDef::integer("close").required(),
        FieldDef::text("change_code", 5),
        FieldDef::integer("changes").required(),
        FieldDef::float("changes_ratio").required(),
        FieldDef::integer("open").required(),
        FieldDef::integer("high").required(),
        FieldDef::integer("low").required(),
        FieldDef::integer("volume").required(),
        FieldDef::integer("amount").required(),
        FieldDef::integer("marcap").required(),
        FieldDef::integer("stocks").required(),
        FieldDef::text("market_id", 10),
        FieldDef::date("last_refreshed").required(),
    ],
    natural_key: &["code"],
    partition_key: None,
};

/// Listed company with its latest trade snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub code: String,
    pub isu_cd: Option<String>,
    pub name: String,
    pub market: Option<String>,
    pub dept: Option<String>,
    pub close: i64,
    pub change_code: Option<String>,
    pub changes: i64,
    pub changes_ratio: f64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub volume: i64,
    pub amount: i64,
    pub marcap: i64,
    pub stocks: i64,
    pub market_id: Option<String>,
    /// Date of the last directory sync that wrote this row.
    pub last_refreshed: NaiveDate,
}

impl StoredRecord for CompanyRecord {
    fn schema() -> &'static TableSchema {
        &COMPANY_INFO
    }

    fn to_row(&self) -> Row {
        vec![
            self.code.clone().into(),
            self.isu_cd.clone().into(),
            self.name.clone().into(),
            self.market.clone().into(),
            self.dept.clone().into(),
            self.close.into(),
            self.change_code.clone().into(),
            self.changes.into(),
            self.changes_ratio.into(),
            self.open.into(),
            self.high.into(),
            self.low.into(),
            self.volume.into(),
            self.amount.into(),
            self.marcap.into(),
            self.stocks.into(),
            self.market_id.clone().into(),
            self.last_refreshed.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new(&COMPANY_INFO, row);
        Ok(Self {
            code: r.text("code")?,
            isu_cd: r.opt_text("isu_cd")?,
            name: r.text("name")?,
            market: r.opt_text("market")?,
            dept: r.opt_text("dept")?,
            close: r.integer("close")?,
            change_code: r.opt_text("change_code")?,
            changes: r.integer("changes")?,
            changes_ratio: r.float("changes_ratio")?,
            open: r.integer("open")?,
            high: r.integer("high")?,
            low: r.integer("low")?,
            volume: r.integer("volume")?,
            amount: r.integer("amount")?,
            marcap: r.integer("marcap")?,
            stocks: r.integer("stocks")?,
            market_id: r.opt_text("market_id")?,
            last_refreshed: r.date("last_refreshed")?,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_company(code: &str, name: &str, today: NaiveDate) -> CompanyRecord {
    CompanyRecord {
        code: code.to_string(),
        isu_cd: Some(format!("KR7{}003", code)),
        name: name.to_string(),
        market: Some("KOSPI".to_string()),
        dept: None,
        close: 70_000,
        change_code: Some("1".to_string()),
        changes: 500,
        changes_ratio: 0.72,
        open: 69_500,
        high: 70_200,
        low: 69_300,
        volume: 1_000_000,
        amount: 70_000_000_000,
        marcap: 417_000_000_000_000,
        stocks: 5_969_782_550,
        market_id: Some("STK".to_string()),
        last_refreshed: today,
    }
}
