// 외부에 공개하는 모듈
pub mod models;
pub mod data_provider;
pub mod errors;
pub mod store;

// 바이너리에서 사용하는 파이프라인 구성 요소
pub mod config;
pub mod logging;
pub mod scrapers;
pub mod services;
pub mod util;

// 자주 쓰는 타입 재노출
pub use models::company::CompanyRecord;
pub use models::daily_price::DailyPriceRecord;
pub use data_provider::DataProvider;
pub use errors::{Result, DataHubError};
pub use services::sync_service::{DirectoryOutcome, PriceSyncSummary, SyncService};
pub use store::{ArrowStore, MemoryStore, Store};
