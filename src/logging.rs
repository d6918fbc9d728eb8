use crate::errors::Result;
use chrono::{Local, NaiveDate};
use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Dated log file for one pipeline, e.g. `daily_price_log_file_2025-06-02.log`.
pub fn log_file_path(log_dir: &Path, pipeline: &str, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("{}_log_file_{}.log", pipeline, date.format("%Y-%m-%d")))
}

/// Installs the process logger. Without a log directory records go to stderr.
///
/// `RUST_LOG` overrides the default `info` filter. Returns `false` when another
/// logger was already installed and is kept.
pub fn init(log_dir: Option<&Path>, pipeline: &str, today: NaiveDate) -> Result<bool> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[ {} | {} ] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path(dir, pipeline, today))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    if let Err(e) = builder.try_init() {
        eprintln!("warning: keeping the existing logger, {} output is not redirected: {}", pipeline, e);
        return Ok(false);
    }
    Ok(true)
}
