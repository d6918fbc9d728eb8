use crate::errors::{DataHubError, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Page cap used when the settings file is missing or unreadable.
pub const DEFAULT_PAGES_TO_FETCH: u32 = 100;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Run configuration, built once per invocation and handed to the services.
#[derive(Debug, Clone)]
pub struct Config {
    pub debug_mode: bool,
    pub debug_stock_limit: usize,
    pub data_dir: String,
    pub config_path: String,
    pub log_dir: Option<String>,
    pub pages_to_fetch: u32,
    pub request_interval: Duration,
    pub listing_lookback_days: u32,
    pub user_agent: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            debug_mode: false,
            debug_stock_limit: 10,
            data_dir: "data".to_string(),
            config_path: "config.json".to_string(),
            log_dir: None,
            pages_to_fetch: DEFAULT_PAGES_TO_FETCH,
            request_interval: Duration::from_millis(200),
            listing_lookback_days: 7,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_debug_stock_limit(mut self, limit: usize) -> Self {
        self.debug_stock_limit = limit;
        self
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_config_path(mut self, path: &str) -> Self {
        self.config_path = path.to_string();
        self
    }

    pub fn with_log_dir(mut self, dir: Option<&str>) -> Self {
        self.log_dir = dir.map(|d| d.to_string());
        self
    }

    /// A cap of zero would fetch nothing, so it is raised to one page.
    pub fn with_pages_to_fetch(mut self, pages: u32) -> Self {
        self.pages_to_fetch = pages.max(1);
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_listing_lookback_days(mut self, days: u32) -> Self {
        self.listing_lookback_days = days;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk settings shared between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_pages_to_fetch")]
    pub pages_to_fetch: u32,
}

fn default_pages_to_fetch() -> u32 {
    DEFAULT_PAGES_TO_FETCH
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pages_to_fetch: DEFAULT_PAGES_TO_FETCH,
        }
    }
}

/// Reads `pages_to_fetch` from the settings file.
///
/// A missing file is created with the default so later runs reuse the same cap.
/// A file that cannot be decoded yields the default and is left as is.
pub fn load_page_cap(path: &Path) -> u32 {
    match read_settings(path) {
        Ok(settings) => {
            info!("Loaded pages_to_fetch from {}: {}", path.display(), settings.pages_to_fetch);
            settings.pages_to_fetch.max(1)
        }
        Err(DataHubError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "{} not found. Creating with default pages_to_fetch={}",
                path.display(),
                DEFAULT_PAGES_TO_FETCH
            );
            if let Err(e) = write_settings(path, &SyncSettings::default()) {
                error!("Failed to write {}: {}", path.display(), e);
            }
            DEFAULT_PAGES_TO_FETCH
        }
        Err(e) => {
            error!(
                "Error reading {}: {}. Using default pages_to_fetch={}",
                path.display(),
                e,
                DEFAULT_PAGES_TO_FETCH
            );
            DEFAULT_PAGES_TO_FETCH
        }
    }
}

pub fn read_settings(path: &Path) -> Result<SyncSettings> {
    let text = fs::read_to_string(path)?;
    let settings = serde_json::from_str(&text)?;
    Ok(settings)
}

pub fn write_settings(path: &Path, settings: &SyncSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let text = serde_json::to_string_pretty(settings)?;
    fs::write(path, text)?;
    Ok(())
}
