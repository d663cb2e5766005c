// Engine settings, loaded from a JSON file or defaulted.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared::models::TimeFrame;

use crate::data::RetryPolicy;
use crate::error::{EngineError, Result};
use crate::indicators::{rsi, Ema, Indicator, Rsi, Supertrend, Vwap};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FetchRetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for FetchRetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        FetchRetrySettings {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff_ms,
        }
    }
}

impl From<&FetchRetrySettings> for RetryPolicy {
    fn from(settings: &FetchRetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            initial_backoff_ms: settings.initial_backoff_ms,
        }
    }
}

/// Replay session settings. Dates are written in the human format "1 Jan 2024 00:00:00"
/// and parsed when the settings are deserialized.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub symbol: String,
    pub timeframes: Vec<TimeFrame>,
    #[serde(with = "human_date")]
    pub from_date: DateTime<Utc>,
    #[serde(with = "human_date")]
    pub end_date: DateTime<Utc>,
    /// First simulated instant; derived from the history when absent.
    #[serde(with = "human_date::option")]
    pub current_time: Option<DateTime<Utc>>,
    pub indicators: Vec<Indicator>,
    pub min_candles: usize,
    pub time_increment_minutes: i64,
    pub base_path: PathBuf,
    pub save_path: PathBuf,
    pub persist_cache: bool,
    pub fetch_retry: FetchRetrySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            symbol: "SOLUSDT".to_string(),
            timeframes: vec![TimeFrame::Minute15, TimeFrame::Hour1, TimeFrame::Hour4, TimeFrame::Day1],
            from_date: midnight(2024, 1, 1),
            end_date: midnight(2024, 12, 1),
            current_time: None,
            indicators: vec![
                Indicator::Rsi(Rsi::new(rsi::DEFAULT_LENGTH)),
                Indicator::Vwap(Vwap::new()),
                Indicator::Supertrend(Supertrend::default()),
                Indicator::Ema(Ema::new(20)),
                Indicator::Ema(Ema::new(200)),
            ],
            min_candles: 100,
            time_increment_minutes: 5,
            base_path: PathBuf::from("data"),
            save_path: PathBuf::from("data/cache"),
            persist_cache: false,
            fetch_retry: FetchRetrySettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigError(format!("Failed to read settings '{}': {}", path.display(), e))
        })?;
        let settings: EngineSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn step(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.time_increment_minutes)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.save_path.join(format!("{}_cached_data.csv", self.symbol))
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::ConfigError("symbol must not be empty".to_string()));
        }
        if self.timeframes.is_empty() {
            return Err(EngineError::ConfigError("timeframes must not be empty".to_string()));
        }
        if self.min_candles == 0 {
            return Err(EngineError::ConfigError("min_candles must be at least 1".to_string()));
        }
        if self.time_increment_minutes <= 0 {
            return Err(EngineError::ConfigError(
                "time_increment_minutes must be positive".to_string(),
            ));
        }
        if self.end_date < self.from_date {
            return Err(EngineError::ConfigError(format!(
                "end_date ({}) precedes from_date ({})",
                self.end_date, self.from_date
            )));
        }
        Ok(())
    }
}

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// `DateTime<Utc>` as "1 Jan 2024 00:00:00"; the time part may be shortened or left out.
mod human_date {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use shared::utils::{format_human_datetime, parse_human_datetime};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_human_datetime(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_human_datetime(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_some(&format_human_datetime(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| parse_human_datetime(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
