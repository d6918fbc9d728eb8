use chrono::NaiveDate;

/// Whether the directory needs to be fetched again.
///
/// False only when a watermark exists and is not older than `today`; an empty
/// store (no watermark) always needs a refresh.
pub fn needs_refresh(current_watermark: Option<NaiveDate>, today: NaiveDate) -> bool {
    match current_watermark {
        Some(watermark) => watermark < today,
        None => true,
    }
}
