use crate::errors::{DataHubError, Result};
use crate::models::raw::RawTable;
use crate::scrapers::base::{ListingSource, RequestPacer};
use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate};
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const KRX_JSON_URL: &str = "http://data.krx.co.kr/comm/bldAttendant/getJsonData.cmd";
const KRX_REFERER: &str = "http://data.krx.co.kr/contents/MDC/MDI/mdiLoader/index.cmd?menuId=MDC0201020101";
/// 전종목 시세 (all listed equities, one trading day).
const LISTING_BLD: &str = "dbms/MDC/STAT/standard/MDCSTAT01501";

/// KRX portal field → listing label.
pub const KRX_FIELD_LABELS: &[(&str, &str)] = &[
    ("ISU_SRT_CD", "Code"),
    ("ISU_CD", "ISU_CD"),
    ("ISU_ABBRV", "Name"),
    ("MKT_NM", "Market"),
    ("SECT_TP_NM", "Dept"),
    ("TDD_CLSPRC", "Close"),
    ("FLUC_TP_CD", "ChangeCode"),
    ("CMPPREVDD_PRC", "Changes"),
    ("FLUC_RT", "ChagesRatio"),
    ("TDD_OPNPRC", "Open"),
    ("TDD_HGPRC", "High"),
    ("TDD_LWPRC", "Low"),
    ("ACC_TRDVOL", "Volume"),
    ("ACC_TRDVAL", "Amount"),
    ("MKTCAP", "Marcap"),
    ("LIST_SHRS", "Stocks"),
    ("MKT_ID", "MarketId"),
];

/// 한국거래소 상장 종목 디렉터리
pub struct KrxListingScraper {
    client: Client,
    pacer: RequestPacer,
    lookback_days: u32,
}

impl KrxListingScraper {
    pub fn new(user_agent: &str, request_interval: Duration, lookback_days: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .map_err(DataHubError::RequestError)?;

        Ok(Self {
            client,
            pacer: RequestPacer::new(request_interval),
            lookback_days,
        })
    }

    async fn fetch_trading_day(&self, date: NaiveDate) -> Result<RawTable> {
        let trd_dd = date.format("%Y%m%d").to_string();
        self.pacer.wait().await;

        let response = self
            .client
            .post(KRX_JSON_URL)
            .header("Referer", KRX_REFERER)
            .form(&[
                ("bld", LISTING_BLD),
                ("locale", "ko_KR"),
                ("mktId", "ALL"),
                ("trdDd", trd_dd.as_str()),
                ("share", "1"),
                ("money", "1"),
                ("csvxls_isNo", "false"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let json: Value = response.json().await?;
        debug!("KRX listing response received for {}", trd_dd);
        parse_listing_json(&json)
    }
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Converts a portal response into a labelled listing table.
pub fn parse_listing_json(json: &Value) -> Result<RawTable> {
    let block = json
        .get("OutBlock_1")
        .and_then(|b| b.as_array())
        .ok_or_else(|| DataHubError::FetchError("KRX response has no OutBlock_1".to_string()))?;

    let mut table = RawTable::new(KRX_FIELD_LABELS.iter().map(|(_, label)| label.to_string()).collect());
    for item in block {
        let Some(object) = item.as_object() else { continue };
        table.push_row(
            KRX_FIELD_LABELS
                .iter()
                .map(|(field, _)| cell_text(object.get(*field)))
                .collect(),
        );
    }
    Ok(table)
}

#[async_trait]
impl ListingSource for KrxListingScraper {
    fn source_name(&self) -> &'static str {
        "KRX"
    }

    async fn fetch_listing(&self, date: &NaiveDate) -> Result<RawTable> {
        info!("Fetching KRX listing for {}", date);

        // 휴장일이면 직전 거래일까지 거슬러 올라감
        for offset in 0..=self.lookback_days {
            let day = *date - DateDuration::days(i64::from(offset));
            let table = self.fetch_trading_day(day).await?;
            if !table.is_empty() {
                info!("Fetched {} listed issues for trading day {}", table.len(), day);
                return Ok(table);
            }
            debug!("No KRX listing rows for {}, trying the previous day", day);
        }

        warn!("No KRX listing found within {} days before {}", self.lookback_days, date);
        Ok(RawTable::default())
    }
}
