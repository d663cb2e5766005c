// Historical candle series for one symbol, one per configured timeframe.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::models::{Candle, TimeFrame};

use super::fetcher::CandleFetcher;
use crate::error::{EngineError, Result};
use crate::models::Series;

pub struct SeriesStore {
    symbol: String,
    data: HashMap<TimeFrame, Series>,
}

impl SeriesStore {
    pub fn new(symbol: &str) -> Self {
        SeriesStore {
            symbol: symbol.to_string(),
            data: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Merges `new_candles` into the timeframe's series. The result is sorted by open time
    /// and keeps the first candle seen for any repeated open time.
    pub fn add_candles(&mut self, timeframe: TimeFrame, new_candles: Vec<Candle>) -> Result<()> {
        let mut merged: Vec<Candle> = self
            .data
            .remove(&timeframe)
            .map(|s| s.candles().to_vec())
            .unwrap_or_default();
        let before = merged.len() + new_candles.len();
        merged.extend(new_candles);
        merged.sort_by_key(|c| c.open_time);
        merged.dedup_by_key(|c| c.open_time);

        let dropped = before - merged.len();
        if dropped > 0 {
            tracing::warn!(symbol = %self.symbol, %timeframe, dropped, "Dropped duplicate candles");
        }
        let series = Series::from_candles(&self.symbol, timeframe, merged)?;
        self.data.insert(timeframe, series);
        Ok(())
    }

    pub fn get(&self, timeframe: TimeFrame) -> Option<&Series> {
        self.data.get(&timeframe)
    }

    /// Like [`SeriesStore::get`], failing when nothing was loaded for the timeframe.
    pub fn series(&self, timeframe: TimeFrame) -> Result<&Series> {
        self.get(timeframe).ok_or_else(|| {
            EngineError::MarketDataError(format!("No {} series loaded for {}", timeframe, self.symbol))
        })
    }

    pub fn timeframes(&self) -> impl Iterator<Item = TimeFrame> + '_ {
        self.data.keys().copied()
    }

    /// Bulk historical load: one fetch per timeframe covering `[start, end]`.
    pub fn load_from_fetcher<F: CandleFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
        timeframes: &[TimeFrame],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        for &timeframe in timeframes {
            let candles = fetcher.fetch(&self.symbol, timeframe, start, end)?;
            if candles.is_empty() {
                tracing::warn!(symbol = %self.symbol, %timeframe, "Fetch returned no candles");
            }
            tracing::info!(symbol = %self.symbol, %timeframe, count = candles.len(), "Loaded series");
            self.add_candles(timeframe, candles)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hour(h: i64, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle::new(start + Duration::hours(h), TimeFrame::Hour1, close, close, close, close, 1.0)
    }

    #[test]
    fn test_add_candles_sorts_and_dedups() {
        let mut store = SeriesStore::new("SOLUSDT");
        store
            .add_candles(TimeFrame::Hour1, vec![hour(2, 3.0), hour(0, 1.0), hour(1, 2.0)])
            .unwrap();
        store
            .add_candles(TimeFrame::Hour1, vec![hour(2, 99.0), hour(3, 4.0)])
            .unwrap();

        let series = store.get(TimeFrame::Hour1).unwrap();
        let closes: Vec<f64> = series.candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_missing_timeframe() {
        let store = SeriesStore::new("SOLUSDT");
        assert!(store.get(TimeFrame::Day1).is_none());
        assert!(matches!(store.series(TimeFrame::Day1), Err(EngineError::MarketDataError(_))));
    }
}
