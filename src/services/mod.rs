pub mod change_gate;
pub mod normalizer;
pub mod page_aggregator;
pub mod sync_service;
pub mod upsert;

pub use sync_service::{DirectoryOutcome, PriceSyncSummary, SkipReason, SyncService};
