use chrono::{DateTime, Utc};
use shared::models::TimeFrame;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("CSV parsing system error: {source}")]
    CsvSystemError {
        #[from]
        source: csv::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("CSV data format error: {0}")]
    CsvDataFormatError(String),

    #[error("Market data store error: {0}")]
    MarketDataError(String),

    /// The query time precedes the earliest candle available for a timeframe.
    #[error("Query time {at} precedes the earliest {timeframe} candle ({earliest})")]
    OutOfRange {
        timeframe: TimeFrame,
        at: DateTime<Utc>,
        earliest: String,
    },

    /// An indicator asked for a column the series does not carry.
    #[error("Missing column '{column}'")]
    MissingColumn { column: String },

    #[error("Indicator calculation error: {0}")]
    IndicatorError(String),

    /// The fetch collaborator failed. `transient` failures are eligible for retry.
    #[error("Fetch failed after {attempts} attempt(s): {message}")]
    FetchFailure {
        attempts: u32,
        message: String,
        transient: bool,
    },
}

impl EngineError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        EngineError::MissingColumn {
            column: column.into(),
        }
    }

    /// A single failed fetch attempt that may succeed if repeated.
    pub fn transient_fetch(message: impl Into<String>) -> Self {
        EngineError::FetchFailure {
            attempts: 1,
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::FetchFailure { transient: true, .. })
    }
}
