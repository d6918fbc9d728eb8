use crate::errors::{DataHubError, Result};
use crate::models::raw::RawTable;
use crate::scrapers::base::{PricePage, PriceSource, RequestPacer};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const NAVER_DAILY_URL: &str = "https://finance.naver.com/item/sise_day.naver";

/// 네이버 금융 일별 시세 페이지
pub struct NaverPriceScraper {
    client: Client,
    pacer: RequestPacer,
}

impl NaverPriceScraper {
    pub fn new(user_agent: &str, request_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .map_err(DataHubError::RequestError)?;

        Ok(Self {
            client,
            pacer: RequestPacer::new(request_interval),
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| DataHubError::FetchError(format!("Invalid selector {}: {:?}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last page number from the `td.pgRR` ("맨뒤") link, e.g. `...&page=673`.
pub fn discover_last_page(document: &Html) -> Option<u32> {
    let link = selector("td.pgRR a").ok()?;
    let href = document.select(&link).next()?.value().attr("href")?;
    href.rsplit('=')
        .next()
        .and_then(|n| n.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// First `table.type2` of the page as header labels and row cells.
pub fn parse_price_table(document: &Html) -> Result<RawTable> {
    let table_selector = selector("table.type2")?;
    let header_selector = selector("th")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| DataHubError::FetchError("Daily price table not found".to_string()))?;

    let columns: Vec<String> = table.select(&header_selector).map(element_text).collect();
    if columns.is_empty() {
        return Err(DataHubError::FetchError("Daily price table has no header".to_string()));
    }

    let mut raw = RawTable::new(columns);
    for row in table.select(&row_selector) {
        let cells: Vec<String> = row.select(&cell_selector).map(element_text).collect();
        // 구분선 행 제외
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        raw.push_row(cells);
    }
    Ok(raw)
}

pub fn parse_price_page(html: &str) -> Result<PricePage> {
    let document = Html::parse_document(html);
    Ok(PricePage {
        table: parse_price_table(&document)?,
        last_page: discover_last_page(&document),
    })
}

#[async_trait]
impl PriceSource for NaverPriceScraper {
    fn source_name(&self) -> &'static str {
        "NAVER"
    }

    async fn fetch_page(&self, code: &str, page: u32) -> Result<PricePage> {
        self.pacer.wait().await;

        let page_str = page.to_string();
        let html = self
            .client
            .get(NAVER_DAILY_URL)
            .query(&[("code", code), ("page", page_str.as_str())])
            .header("Referer", format!("https://finance.naver.com/item/sise.naver?code={}", code))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let parsed = parse_price_page(&html)?;
        debug!("{} page {}: {} rows", code, page, parsed.table.len());
        Ok(parsed)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_PAGE: &str = r#"
<html><body>
<table cellspacing="0" class="type2">
  <tr>
    <th>날짜</th><th>종가</th><th>전일비</th><th>시가</th><th>고가</th><th>저가</th><th>거래량</th>
  </tr>
  <tr><td colspan="7" height="8"></td></tr>
  <tr onmouseover="mouseOver(this)">
    <td align="center"><span class="tah p10 gray03">2025.06.02</span></td>
    <td class="num"><span class="tah p11">70,000</span></td>
    <td class="num">
      <em class="bu_p bu_pup"><span class="blind">상승</span></em>
      <span class="tah p11 red02">1,250</span>
    </td>
    <td class="num"><span class="tah p11">69,500</span></td>
    <td class="num"><span class="tah p11">70,200</span></td>
    <td class="num"><span class="tah p11">69,300</span></td>
    <td class="num"><span class="tah p11">10,123,456</span></td>
  </tr>
  <tr onmouseover="mouseOver(this)">
    <td align="center"><span class="tah p10 gray03">2025.05.30</span></td>
    <td class="num"><span class="tah p11">68,750</span></td>
    <td class="num"><span class="tah p11">0</span></td>
    <td class="num"><span class="tah p11">68,750</span></td>
    <td class="num"><span class="tah p11">69,000</span></td>
    <td class="num"><span class="tah p11">68,100</span></td>
    <td class="num"><span class="tah p11">8,000,000</span></td>
  </tr>
</table>
<table summary="페이지 네비게이션 리스트" class="Nnavi" align="center">
  <tr>
    <td class="on"><a href="/item/sise_day.naver?code=005930&amp;page=1">1</a></td>
    <td><a href="/item/sise_day.naver?code=005930&amp;page=2">2</a></td>
    <td class="pgRR"><a href="/item/sise_day.naver?code=005930&amp;page=673">맨뒤</a></td>
  </tr>
</table>
</body></html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_and_pagination() {
        let page = parse_price_page(SAMPLE_PAGE).unwrap();

        assert_eq!(page.last_page, Some(673));
        assert_eq!(page.table.columns()[0], "날짜");
        assert_eq!(page.table.len(), 2);

        let first = page.table.records().next().unwrap();
        assert_eq!(first.get("날짜"), Some("2025.06.02"));
        assert_eq!(first.get("전일비"), Some("상승 1,250"));
        assert_eq!(first.get("거래량"), Some("10,123,456"));
    }

    #[test]
    fn single_page_history_has_no_control() {
        let html = SAMPLE_PAGE.replace("pgRR", "pgR");
        assert_eq!(parse_price_page(&html).unwrap().last_page, None);
    }

    #[test]
    fn unparsable_control_is_ignored() {
        let html = SAMPLE_PAGE.replace("page=673", "page=last");
        assert_eq!(parse_price_page(&html).unwrap().last_page, None);
    }

    #[test]
    fn page_without_table_is_a_fetch_error() {
        let err = parse_price_page("<html><body><p>점검 중</p></body></html>").unwrap_err();
        assert!(err.is_fetch_error());
    }
}
