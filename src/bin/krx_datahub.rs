use krx_datahub::config::{self, Config};
use krx_datahub::data_provider::DataProvider;
use krx_datahub::logging;
use krx_datahub::scrapers::base::{ListingSource, PriceSource};
use krx_datahub::scrapers::krx::KrxListingScraper;
use krx_datahub::scrapers::naver::NaverPriceScraper;
use krx_datahub::services::sync_service::{DirectoryOutcome, PriceSyncSummary, SyncService};
use krx_datahub::store::{ArrowStore, MemoryStore, Store};

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Seoul;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

fn today_in_seoul() -> NaiveDate {
    Utc::now().with_timezone(&Seoul).date_naive()
}

fn date_arg(matches: &ArgMatches, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match matches.value_of("date") {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --date {}", s)),
        None => Ok(today),
    }
}

fn report_directory(outcome: &DirectoryOutcome) {
    match outcome {
        DirectoryOutcome::UpToDate { watermark } => info!("Directory up to date (last refreshed {})", watermark),
        DirectoryOutcome::Aborted { reason } => warn!("Directory sync aborted: {}", reason),
        DirectoryOutcome::RolledBack { reason } => warn!("Directory sync rolled back: {}", reason),
        DirectoryOutcome::Updated { counts, dropped } => info!(
            "Directory sync done: {} inserted, {} updated, {} dropped",
            counts.inserted, counts.updated, dropped
        ),
    }
}

fn report_prices(summary: &PriceSyncSummary) {
    info!(
        "Price sync done: {}/{} companies, {} inserted, {} updated",
        summary.succeeded, summary.entities, summary.counts.inserted, summary.counts.updated
    );
    for skipped in &summary.skipped {
        warn!("  skipped {} ({}): {}", skipped.name, skipped.code, skipped.reason);
    }
}

async fn run_sync<S: Store>(
    mut service: SyncService<S>,
    command: &str,
    matches: &ArgMatches,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match command {
        "company" => {
            let outcome = service.sync_directory(date_arg(matches, today)?).await?;
            report_directory(&outcome);
        }
        "daily" => {
            let codes: Vec<String> = matches
                .values_of("code")
                .map(|values| values.map(String::from).collect())
                .unwrap_or_default();
            let summary = service.sync_prices_for(&codes).await?;
            report_prices(&summary);
        }
        "all" => {
            let outcome = service.sync_directory(date_arg(matches, today)?).await?;
            report_directory(&outcome);
            let summary = service.sync_prices().await?;
            report_prices(&summary);
        }
        other => bail!("Unknown command: {}", other),
    }
    Ok(())
}

fn show(store: &ArrowStore, matches: &ArgMatches) -> anyhow::Result<()> {
    let provider = DataProvider::new(store)?;
    let limit = matches
        .value_of("limit")
        .unwrap_or("10")
        .parse::<usize>()
        .unwrap_or(10);

    info!("Found {} companies in store", provider.get_all_companies().len());
    if let Some(watermark) = provider.get_directory_watermark()? {
        info!("Directory last refreshed: {}", watermark);
    }

    let Some(code) = matches.value_of("code") else {
        return Ok(());
    };
    let Some(company) = provider.get_company(code) else {
        warn!("{} not found in company_info", code);
        return Ok(());
    };

    info!(
        "Company: {} ({}) - {}",
        company.name,
        company.code,
        company.market.as_deref().unwrap_or("-")
    );
    info!("{:-<80}", "");
    info!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>8} {:>15}",
        "Date", "Open", "High", "Low", "Close", "Diff", "Volume"
    );
    info!("{:-<80}", "");

    let prices = provider.get_daily_prices(code)?;
    for daily in prices.iter().take(limit) {
        info!(
            "{:<12} {:>10} {:>10} {:>10} {:>10} {:>8} {:>15}",
            daily.date.format("%Y-%m-%d").to_string(),
            daily.open,
            daily.high,
            daily.low,
            daily.close,
            daily.diff,
            daily.volume
        );
    }
    if prices.len() > limit {
        info!("... and {} more records", prices.len() - limit);
    } else if prices.is_empty() {
        info!("No daily data available for this company");
    }
    Ok(())
}

fn build_app() -> App<'static> {
    let app = App::new("KRX DataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Synchronizes the KRX company directory and daily prices")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the store files")
                .takes_value(true)
                .global(true)
                .default_value("data"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .help("Settings file holding pages_to_fetch")
                .takes_value(true)
                .global(true)
                .default_value("config.json"),
        )
        .arg(
            Arg::with_name("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .help("Write dated log files here instead of stderr")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("memory")
                .long("memory")
                .help("Dry run against an in-memory store")
                .takes_value(false)
                .global(true),
        );

    // 개발 빌드에서만 디버그 옵션 제공
    #[cfg(debug_assertions)]
    let app = app
        .arg(
            Arg::with_name("debug")
                .long("debug")
                .help("Enable debug mode")
                .takes_value(false)
                .global(true),
        )
        .arg(
            Arg::with_name("debug-limit")
                .long("debug-limit")
                .help("Limit the number of companies to process in debug mode")
                .takes_value(true)
                .global(true)
                .default_value("2"),
        );

    let date_arg_def = Arg::with_name("date")
        .short('d')
        .long("date")
        .value_name("DATE")
        .help("Treat this date as today (YYYY-MM-DD)")
        .takes_value(true);

    app.subcommand(
        SubCommand::with_name("company")
            .about("Refresh the listed company directory")
            .arg(date_arg_def.clone()),
    )
    .subcommand(
        SubCommand::with_name("daily")
            .about("Scrape daily price history for listed companies")
            .arg(
                Arg::with_name("code")
                    .short('c')
                    .long("code")
                    .value_name("CODE")
                    .help("Only sync these codes (repeatable)")
                    .takes_value(true)
                    .multiple_occurrences(true),
            )
            .arg(
                Arg::with_name("pages")
                    .long("pages")
                    .value_name("PAGES")
                    .help("Page cap for this run, overriding the settings file")
                    .takes_value(true),
            ),
    )
    .subcommand(
        SubCommand::with_name("all")
            .about("Refresh the directory, then daily prices")
            .arg(date_arg_def),
    )
    .subcommand(
        SubCommand::with_name("show")
            .about("Show a company and its recent daily prices")
            .arg(
                Arg::with_name("code")
                    .short('c')
                    .long("code")
                    .value_name("CODE")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("limit")
                    .short('l')
                    .long("limit")
                    .value_name("LIMIT")
                    .takes_value(true)
                    .default_value("10"),
            ),
    )
}

/// Options shared by every subcommand.
#[derive(Debug)]
struct RunOptions {
    data_dir: String,
    config_path: String,
    log_dir: Option<String>,
    memory: bool,
    debug_mode: bool,
    debug_stock_limit: usize,
    /// `daily --pages`; other subcommands use the settings file.
    pages_override: Option<u32>,
}

fn run_options(command: &str, matches: &ArgMatches) -> anyhow::Result<RunOptions> {
    #[cfg(debug_assertions)]
    let debug_mode = matches.is_present("debug");
    #[cfg(not(debug_assertions))]
    let debug_mode = false;

    #[cfg(debug_assertions)]
    let debug_stock_limit = matches
        .value_of("debug-limit")
        .unwrap_or("2")
        .parse::<usize>()
        .unwrap_or(2);
    #[cfg(not(debug_assertions))]
    let debug_stock_limit = usize::MAX;

    // --pages 는 daily 에만 정의됨
    let pages_override = match command {
        "daily" => matches
            .value_of("pages")
            .map(|p| p.parse::<u32>().with_context(|| format!("invalid --pages {}", p)))
            .transpose()?,
        _ => None,
    };

    Ok(RunOptions {
        data_dir: matches.value_of("data-dir").unwrap_or("data").to_string(),
        config_path: matches.value_of("config").unwrap_or("config.json").to_string(),
        log_dir: matches.value_of("log-dir").map(String::from),
        memory: matches.is_present("memory"),
        debug_mode,
        debug_stock_limit,
        pages_override,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let today = today_in_seoul();

    let matches = build_app().get_matches();
    let Some((command, sub_matches)) = matches.subcommand() else {
        println!("No command specified. Use --help for usage information.");
        return Ok(());
    };
    let options = run_options(command, sub_matches)?;

    let pipeline = match command {
        "company" => "company",
        "daily" => "daily_price",
        other => other,
    };
    logging::init(options.log_dir.as_deref().map(Path::new), pipeline, today)?;

    if command == "show" {
        let mut store = ArrowStore::open(&options.data_dir)?;
        store.create_schema_if_absent(&krx_datahub::models::company::COMPANY_INFO)?;
        store.create_schema_if_absent(&krx_datahub::models::daily_price::DAILY_PRICE)?;
        return show(&store, sub_matches);
    }

    let pages_to_fetch = match options.pages_override {
        Some(pages) => pages,
        None => config::load_page_cap(Path::new(&options.config_path)),
    };

    let config = Config::new()
        .with_data_dir(&options.data_dir)
        .with_config_path(&options.config_path)
        .with_log_dir(options.log_dir.as_deref())
        .with_debug_mode(options.debug_mode)
        .with_debug_stock_limit(options.debug_stock_limit)
        .with_pages_to_fetch(pages_to_fetch);
    if options.debug_mode {
        info!("DEBUG MODE: processing at most {} companies", config.debug_stock_limit);
    }

    let listing_source: Arc<dyn ListingSource + Send + Sync> = Arc::new(KrxListingScraper::new(
        &config.user_agent,
        config.request_interval,
        config.listing_lookback_days,
    )?);
    let price_source: Arc<dyn PriceSource + Send + Sync> =
        Arc::new(NaverPriceScraper::new(&config.user_agent, config.request_interval)?);

    if options.memory {
        info!("Using in-memory store; nothing will be persisted");
        let service = SyncService::new(config, MemoryStore::new(), listing_source, price_source)?;
        run_sync(service, command, sub_matches, today).await
    } else {
        let store = ArrowStore::open(config.data_path())
            .with_context(|| format!("cannot open store at {}", config.data_dir))?;
        let service = SyncService::new(config, store, listing_source, price_source)?;
        run_sync(service, command, sub_matches, today).await
    }
}
