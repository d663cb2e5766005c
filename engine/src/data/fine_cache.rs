// Finest-resolution candles fetched on demand while the simulation advances.
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use shared::models::{Candle, TimeFrame};

use super::csv_parser::KlineCsv;
use super::fetcher::CandleFetcher;
use crate::error::{EngineError, Result};

/// Append-only 1-minute series for one symbol, created once per run.
///
/// `covered` is the requested range `[start, end]` the cache has answered so far. Candles
/// may be sparser than that range when the source has gaps.
#[derive(Debug, Clone)]
pub struct FineGrainCache {
    symbol: String,
    candles: Vec<Candle>,
    covered: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl FineGrainCache {
    pub fn new(symbol: &str) -> Self {
        FineGrainCache {
            symbol: symbol.to_string(),
            candles: Vec::new(),
            covered: None,
        }
    }

    pub fn timeframe(&self) -> TimeFrame {
        TimeFrame::FINEST
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn covered_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.covered
    }

    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        matches!(self.covered, Some((lo, hi)) if lo <= start && end <= hi)
    }

    /// Appends fetched candles. The batch is sorted and deduplicated first, and anything not
    /// strictly newer than the last cached candle is dropped, so the cache is never reordered.
    /// Returns the number of candles appended.
    pub fn extend(&mut self, mut batch: Vec<Candle>) -> usize {
        batch.sort_by_key(|c| c.open_time);
        batch.dedup_by_key(|c| c.open_time);
        if let Some(last) = self.candles.last().map(|c| c.open_time) {
            batch.retain(|c| c.open_time > last);
        }
        let added = batch.len();
        self.candles.extend(batch);
        added
    }

    /// Makes sure every fine candle with open time up to `end` has been requested, fetching
    /// only the part past the covered range. `start` only matters for the first fill.
    pub fn ensure_covered<F: CandleFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        let fetch_from = match self.covered {
            Some((lo, _)) if start < lo => {
                return Err(EngineError::OutOfRange {
                    timeframe: TimeFrame::FINEST,
                    at: start,
                    earliest: lo.to_string(),
                })
            }
            Some((_, hi)) if end <= hi => return Ok(()),
            Some((_, hi)) => hi + Duration::milliseconds(1),
            None => start,
        };
        if end < fetch_from {
            return Ok(());
        }

        // Validated before anything is merged, so a failed fetch leaves the cache unchanged.
        let batch = fetcher.fetch(&self.symbol, TimeFrame::FINEST, fetch_from, end)?;
        let fetched = batch.len();
        let added = self.extend(batch);
        if added == 0 {
            tracing::warn!(symbol = %self.symbol, from = %fetch_from, to = %end, "No fine candles in requested range");
        }
        tracing::debug!(symbol = %self.symbol, from = %fetch_from, to = %end, fetched, added, "Extended fine cache");

        let lo = self.covered.map_or(fetch_from, |(lo, _)| lo);
        self.covered = Some((lo, end));
        Ok(())
    }

    /// Cached candles with open time in `[start, end]`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.open_time < start);
        let hi = self.candles.partition_point(|c| c.open_time <= end);
        &self.candles[lo..hi.max(lo)]
    }

    /// Writes the whole cache as a kline table.
    pub fn persist(&self, path: &Path) -> Result<()> {
        KlineCsv::write_candles_to_csv(path, &self.candles)?;
        tracing::debug!(symbol = %self.symbol, count = self.candles.len(), path = %path.display(), "Persisted fine cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn minute(m: i64) -> Candle {
        let price = 100.0 + m as f64;
        Candle::new(t0() + Duration::minutes(m), TimeFrame::Minute1, price, price + 1.0, price - 1.0, price, 1.0)
    }

    /// Serves a gap-free minute series and records each requested range.
    struct MinuteSource {
        requests: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    }

    impl CandleFetcher for MinuteSource {
        fn fetch(&mut self, _: &str, _: TimeFrame, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Candle>> {
            self.requests.push((start, end));
            Ok((0..24 * 60).map(minute).filter(|c| c.open_time >= start && c.open_time <= end).collect())
        }
    }

    #[test]
    fn test_overlapping_extends_never_duplicate() {
        let mut cache = FineGrainCache::new("SOLUSDT");
        assert_eq!(cache.extend((0..10).map(minute).collect()), 10);
        assert_eq!(cache.extend((5..15).rev().map(minute).collect()), 5);
        assert_eq!(cache.extend((0..3).map(minute).collect()), 0);

        let times: Vec<_> = cache.candles().iter().map(|c| c.open_time).collect();
        assert_eq!(times.len(), 15);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ensure_covered_fetches_only_missing_tail() {
        let mut cache = FineGrainCache::new("SOLUSDT");
        let mut source = MinuteSource { requests: Vec::new() };

        cache.ensure_covered(&mut source, t0(), t0() + Duration::minutes(30)).unwrap();
        assert_eq!(cache.len(), 31);
        cache.ensure_covered(&mut source, t0(), t0() + Duration::minutes(20)).unwrap();
        assert_eq!(source.requests.len(), 1);

        cache.ensure_covered(&mut source, t0() + Duration::minutes(10), t0() + Duration::minutes(45)).unwrap();
        assert_eq!(source.requests.len(), 2);
        assert_eq!(source.requests[1].0, t0() + Duration::minutes(30) + Duration::milliseconds(1));
        assert_eq!(cache.len(), 46);
        assert!(cache.covers(t0(), t0() + Duration::minutes(45)));
    }

    #[test]
    fn test_request_before_cache_start_is_out_of_range() {
        let mut cache = FineGrainCache::new("SOLUSDT");
        let mut source = MinuteSource { requests: Vec::new() };
        cache.ensure_covered(&mut source, t0() + Duration::minutes(10), t0() + Duration::minutes(20)).unwrap();
        let err = cache.ensure_covered(&mut source, t0(), t0() + Duration::minutes(20)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange { .. }));
    }

    #[test]
    fn test_failed_fetch_leaves_cache_unchanged() {
        struct Down;
        impl CandleFetcher for Down {
            fn fetch(&mut self, _: &str, _: TimeFrame, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Candle>> {
                Err(EngineError::transient_fetch("timeout"))
            }
        }
        let mut cache = FineGrainCache::new("SOLUSDT");
        cache.extend((0..5).map(minute).collect());
        assert!(cache.ensure_covered(&mut Down, t0(), t0() + Duration::minutes(10)).is_err());
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.covered_range(), None);
    }

    #[test]
    fn test_range_is_inclusive() {
        let mut cache = FineGrainCache::new("SOLUSDT");
        cache.extend((0..10).map(minute).collect());
        let slice = cache.range(t0() + Duration::minutes(2), t0() + Duration::minutes(4));
        assert_eq!(slice.len(), 3);
        assert!(cache.range(t0() + Duration::hours(1), t0() + Duration::hours(2)).is_empty());
    }

    #[test]
    fn test_persist_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SOLUSDT_cached_data.csv");
        let mut cache = FineGrainCache::new("SOLUSDT");
        cache.extend((0..3).map(minute).collect());
        cache.persist(&path).unwrap();
        assert_eq!(KlineCsv::load_candles_from_csv(&path).unwrap(), cache.candles().to_vec());
    }
}
