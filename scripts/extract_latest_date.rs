use krx_datahub::data_provider::DataProvider;
use krx_datahub::models::company::COMPANY_INFO;
use krx_datahub::models::daily_price::DAILY_PRICE;
use krx_datahub::store::{ArrowStore, Store};

use chrono::Datelike;
use std::env;
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let data_dir = env::args().nth(1).unwrap_or_else(|| "data".to_string());
    if !Path::new(&data_dir).join("company_info.arrow").exists() {
        return Err(format!(
            "{}/company_info.arrow not found, run 'cargo run -- company' first",
            data_dir
        )
        .into());
    }

    let mut store = ArrowStore::open(&data_dir)?;
    store.create_schema_if_absent(&COMPANY_INFO)?;
    store.create_schema_if_absent(&DAILY_PRICE)?;
    let provider = DataProvider::new(&store)?;

    match provider.get_directory_watermark()? {
        Some(date) => println!("Directory last refreshed: {}", date),
        None => println!("Directory is empty"),
    }

    match provider.get_latest_trading_date()? {
        Some(date) => {
            println!("Latest trading date: {}", date);
            // YYYY.M.D, no leading zeros
            println!("Version: {}.{}.{}", date.year(), date.month(), date.day());
        }
        None => println!("No daily prices stored"),
    }

    Ok(())
}
