// Market data fetch collaborators: the trait the core calls, a local-table implementation,
// and a retry wrapper for transient failures.
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::models::{Candle, TimeFrame};

use super::csv_parser::KlineCsv;
use crate::error::{EngineError, Result};

/// Source of historical candles. One call per missing range; results are ascending by open
/// time but may contain gaps.
pub trait CandleFetcher {
    /// Candles of `timeframe` whose open time lies in `[start, end]`.
    fn fetch(
        &mut self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

impl<F: CandleFetcher + ?Sized> CandleFetcher for &mut F {
    fn fetch(
        &mut self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        (**self).fetch(symbol, timeframe, start, end)
    }
}

/// Answers fetches from `{base_path}/{symbol}_{timeframe}_data.csv` tables.
pub struct CsvCandleSource {
    base_path: PathBuf,
    tables: HashMap<(String, TimeFrame), Vec<Candle>>,
}

impl CsvCandleSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        CsvCandleSource {
            base_path: base_path.into(),
            tables: HashMap::new(),
        }
    }

    pub fn table_path(&self, symbol: &str, timeframe: TimeFrame) -> PathBuf {
        self.base_path.join(format!("{}_{}_data.csv", symbol, timeframe.label()))
    }

    fn table(&mut self, symbol: &str, timeframe: TimeFrame) -> Result<&[Candle]> {
        let key = (symbol.to_string(), timeframe);
        if !self.tables.contains_key(&key) {
            let path = self.table_path(symbol, timeframe);
            let mut candles = KlineCsv::load_candles_from_csv(&path)?;
            candles.sort_by_key(|c| c.open_time);
            candles.dedup_by_key(|c| c.open_time);
            tracing::debug!(symbol, %timeframe, count = candles.len(), path = %path.display(), "Opened table");
            self.tables.insert(key.clone(), candles);
        }
        Ok(self.tables.get(&key).map(Vec::as_slice).unwrap_or_default())
    }
}

impl CandleFetcher for CsvCandleSource {
    fn fetch(
        &mut self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let table = self.table(symbol, timeframe)?;
        let lo = table.partition_point(|c| c.open_time < start);
        let hi = table.partition_point(|c| c.open_time <= end);
        Ok(table[lo..hi.max(lo)].to_vec())
    }
}

/// Bounded retry policy for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `initial * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: CandleFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        RetryingFetcher { inner, policy }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: CandleFetcher> CandleFetcher for RetryingFetcher<F> {
    fn fetch(
        &mut self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.fetch(symbol, timeframe, start, end) {
                Ok(candles) => return Ok(candles),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        symbol,
                        %timeframe,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient fetch failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(EngineError::FetchFailure {
                        attempts: attempt,
                        message: err.to_string(),
                        transient: false,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::fs;

    struct FlakyFetcher {
        failures_left: u32,
        calls: u32,
    }

    impl CandleFetcher for FlakyFetcher {
        fn fetch(&mut self, _: &str, tf: TimeFrame, start: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Candle>> {
            self.calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(EngineError::transient_fetch("connection reset"));
            }
            Ok(vec![Candle::new(start, tf, 1.0, 1.0, 1.0, 1.0, 1.0)])
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let mut fetcher = RetryingFetcher::new(FlakyFetcher { failures_left: 2, calls: 0 }, no_wait(3));
        let candles = fetcher.fetch("SOLUSDT", TimeFrame::Minute1, t0(), t0()).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(fetcher.into_inner().calls, 3);
    }

    #[test]
    fn test_retry_exhaustion_reports_attempts() {
        let mut fetcher = RetryingFetcher::new(FlakyFetcher { failures_left: 5, calls: 0 }, no_wait(3));
        let err = fetcher.fetch("SOLUSDT", TimeFrame::Minute1, t0(), t0()).unwrap_err();
        assert!(matches!(err, EngineError::FetchFailure { attempts: 3, transient: false, .. }));
        assert_eq!(fetcher.into_inner().calls, 3);
    }

    #[test]
    fn test_non_transient_errors_are_not_retried() {
        struct Broken(u32);
        impl CandleFetcher for Broken {
            fn fetch(&mut self, _: &str, _: TimeFrame, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Candle>> {
                self.0 += 1;
                Err(EngineError::CsvDataFormatError("bad row".to_string()))
            }
        }
        let mut fetcher = RetryingFetcher::new(Broken(0), no_wait(5));
        assert!(fetcher.fetch("SOLUSDT", TimeFrame::Hour1, t0(), t0()).is_err());
        assert_eq!(fetcher.into_inner().0, 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_csv_source_answers_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle::new(t0() + ChronoDuration::minutes(i), TimeFrame::Minute1, 1.0, 2.0, 0.5, 1.5, i as f64))
            .collect();
        let mut source = CsvCandleSource::new(dir.path());
        KlineCsv::write_candles_to_csv(&source.table_path("SOLUSDT", TimeFrame::Minute1), &candles).unwrap();

        let got = source
            .fetch("SOLUSDT", TimeFrame::Minute1, t0() + ChronoDuration::minutes(3), t0() + ChronoDuration::minutes(5))
            .unwrap();
        assert_eq!(got, candles[3..=5].to_vec());

        // Served from memory once loaded.
        fs::remove_file(source.table_path("SOLUSDT", TimeFrame::Minute1)).unwrap();
        let empty = source
            .fetch("SOLUSDT", TimeFrame::Minute1, t0() + ChronoDuration::hours(1), t0() + ChronoDuration::hours(2))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_csv_source_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = CsvCandleSource::new(dir.path());
        let err = source.fetch("SOLUSDT", TimeFrame::Day1, t0(), t0()).unwrap_err();
        assert!(err.to_string().contains("SOLUSDT_1d_data.csv"), "{}", err);
    }
}
