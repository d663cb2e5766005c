// Synthesizes the in-progress candle of a coarse timeframe from finer candles.
use chrono::{DateTime, Duration, Utc};
use shared::models::Candle;

use crate::data::FineGrainCache;

pub struct PartialCandleAggregator;

impl PartialCandleAggregator {
    /// The in-progress candle for the period starting at `closed_at`, as seen at `at`.
    ///
    /// Uses cached fine candles that open at or after `closed_at` and have fully closed before
    /// `at`. `None` when there are none, e.g. when `at` sits exactly on a period boundary.
    /// A range spanning several coarse periods still folds into one candle.
    pub fn partial(cache: &FineGrainCache, closed_at: DateTime<Utc>, at: DateTime<Utc>) -> Option<Candle> {
        if at <= closed_at {
            return None;
        }
        let fine = cache.range(closed_at, at - Duration::milliseconds(1));
        let visible = fine.partition_point(|c| c.is_closed_at(at));
        Self::fold(&fine[..visible])
    }

    /// Folds consecutive candles into one: first open, last close, extreme high and low,
    /// summed volumes and trade counts.
    pub fn fold(candles: &[Candle]) -> Option<Candle> {
        let (first, rest) = candles.split_first()?;
        Some(rest.iter().fold(first.clone(), |mut acc, c| {
            acc.high = acc.high.max(c.high);
            acc.low = acc.low.min(c.low);
            acc.close = c.close;
            acc.close_time = c.close_time;
            acc.volume += c.volume;
            acc.quote_volume += c.quote_volume;
            acc.trade_count += c.trade_count;
            acc.taker_buy_base += c.taker_buy_base;
            acc.taker_buy_quote += c.taker_buy_quote;
            acc
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::models::TimeFrame;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn fine(m: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        let mut c = Candle::new(t0() + Duration::minutes(m), TimeFrame::Minute1, open, high, low, close, volume);
        c.trade_count = 2;
        c.quote_volume = volume * close;
        c
    }

    fn cache_of(candles: Vec<Candle>) -> FineGrainCache {
        let mut cache = FineGrainCache::new("SOLUSDT");
        cache.extend(candles);
        cache
    }

    #[test]
    fn test_empty_range_is_none() {
        let cache = cache_of((0..10).map(|m| fine(m, 1.0, 2.0, 0.5, 1.5, 1.0)).collect());
        // Query exactly on the boundary.
        assert_eq!(PartialCandleAggregator::partial(&cache, t0(), t0()), None);
        // Nothing cached after the boundary.
        let later = t0() + Duration::hours(1);
        assert_eq!(PartialCandleAggregator::partial(&cache, later, later + Duration::minutes(5)), None);
        assert_eq!(PartialCandleAggregator::fold(&[]), None);
    }

    #[test]
    fn test_single_candle_is_identity() {
        let candle = fine(0, 10.0, 12.0, 9.0, 11.0, 3.0);
        let cache = cache_of(vec![candle.clone(), fine(1, 1.0, 1.0, 1.0, 1.0, 1.0)]);
        let partial = PartialCandleAggregator::partial(&cache, t0(), t0() + Duration::minutes(1)).unwrap();
        assert_eq!(partial, candle);
    }

    #[test]
    fn test_unclosed_fine_candle_is_excluded() {
        let cache = cache_of((0..5).map(|m| fine(m, 1.0, 2.0, 0.5, 1.5, 1.0)).collect());
        // At 00:02:30 only minutes 0 and 1 have closed.
        let at = t0() + Duration::seconds(150);
        let partial = PartialCandleAggregator::partial(&cache, t0(), at).unwrap();
        assert_eq!(partial.volume, 2.0);
        assert_eq!(partial.close_time, t0() + Duration::minutes(2) - Duration::milliseconds(1));
    }

    #[test]
    fn test_fold_bounds_and_sums() {
        let candles = vec![
            fine(0, 10.0, 11.0, 9.5, 10.5, 1.0),
            fine(1, 10.5, 13.0, 10.0, 12.0, 2.0),
            fine(2, 12.0, 12.5, 8.0, 9.0, 4.0),
        ];
        let folded = PartialCandleAggregator::fold(&candles).unwrap();
        assert_eq!(folded.open, 10.0);
        assert_eq!(folded.close, 9.0);
        assert_eq!(folded.open_time, candles[0].open_time);
        assert_eq!(folded.close_time, candles[2].close_time);
        assert_eq!(folded.volume, 7.0);
        assert_eq!(folded.trade_count, 6);
        assert_eq!(folded.quote_volume, 10.5 + 24.0 + 36.0);
        for c in &candles {
            assert!(folded.high >= c.high);
            assert!(folded.low <= c.low);
        }
    }

    #[test]
    fn test_gaps_are_tolerated() {
        let cache = cache_of(vec![fine(0, 5.0, 6.0, 4.0, 5.5, 1.0), fine(7, 5.5, 9.0, 5.0, 8.0, 2.0)]);
        let partial = PartialCandleAggregator::partial(&cache, t0(), t0() + Duration::minutes(10)).unwrap();
        assert_eq!((partial.open, partial.close, partial.high, partial.volume), (5.0, 8.0, 9.0, 3.0));
    }
}
