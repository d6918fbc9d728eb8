use crate::errors::Result;
use crate::models::raw::RawTable;
use crate::scrapers::base::PriceSource;
use log::info;

/// Concatenated history pages of one company.
#[derive(Debug, Clone, Default)]
pub struct AggregatedPages {
    pub table: RawTable,
    /// Pages advertised upstream (1 when no pagination control was found).
    pub discovered_pages: u32,
    pub fetched_pages: u32,
}

/// Fetches up to `page_cap` pages of `code`'s history in page order.
///
/// The page count comes from page 1's pagination control. Any failed page
/// fails the whole call so history is never silently truncated.
pub async fn fetch_all_pages<P>(source: &P, code: &str, page_cap: u32) -> Result<AggregatedPages>
where
    P: PriceSource + ?Sized + Sync,
{
    let first = source.fetch_page(code, 1).await?;
    let discovered_pages = first.last_page.unwrap_or(1).max(1);
    let pages_to_process = discovered_pages.min(page_cap.max(1));
    info!(
        "Fetching {} pages for {}. Total pages available: {}",
        pages_to_process, code, discovered_pages
    );

    let mut table = first.table;
    for page in 2..=pages_to_process {
        let next = source.fetch_page(code, page).await?;
        table.append(next.table);
    }

    Ok(AggregatedPages {
        table,
        discovered_pages,
        fetched_pages: pages_to_process,
    })
}
