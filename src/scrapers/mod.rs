pub mod base;
pub mod krx;
pub mod naver;

pub use base::{ListingSource, PricePage, PriceSource};
