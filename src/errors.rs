use thiserror::Error;
use std::num::ParseIntError;

#[derive(Error, Debug)]
pub enum DataHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    /// Upstream unreachable or its payload could not be understood.
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// A single record failed its required-field checks.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The store rejected or failed to commit a batch.
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Parse int error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DataHubError {
    /// Network or upstream-structure failures.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            DataHubError::FetchError(_) | DataHubError::RequestError(_) | DataHubError::JsonError(_)
        )
    }

    /// Failures raised while reading or committing to the store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            DataHubError::StoreError(_) | DataHubError::ArrowError(_) | DataHubError::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DataHubError>;

impl From<arrow::error::ArrowError> for DataHubError {
    fn from(e: arrow::error::ArrowError) -> Self {
        DataHubError::ArrowError(e.to_string())
    }
}

// 문자열에서 에러 생성
impl From<String> for DataHubError {
    fn from(s: String) -> Self {
        DataHubError::Unknown(s)
    }
}

impl From<&str> for DataHubError {
    fn from(s: &str) -> Self {
        DataHubError::Unknown(s.to_string())
    }
}
