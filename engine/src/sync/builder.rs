// Builds the per-tick multi-timeframe snapshot.
use chrono::{DateTime, Utc};
use shared::models::TimeFrame;

use super::aggregator::PartialCandleAggregator;
use super::aligner::{Alignment, TimeframeAligner};
use crate::data::{CandleFetcher, FineGrainCache, SeriesStore};
use crate::error::Result;
use crate::indicators::{self, Indicator};
use crate::models::{Snapshot, TimeframeWindow};

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    timeframes: Vec<TimeFrame>,
    indicators: Vec<Indicator>,
    min_candles: usize,
}

impl SnapshotBuilder {
    pub fn new(timeframes: Vec<TimeFrame>, indicators: Vec<Indicator>, min_candles: usize) -> Self {
        SnapshotBuilder {
            timeframes,
            indicators,
            min_candles,
        }
    }

    pub fn timeframes(&self) -> &[TimeFrame] {
        &self.timeframes
    }

    pub fn min_candles(&self) -> usize {
        self.min_candles
    }

    /// Aligns every timeframe to `at`, synthesizes in-progress candles from the fine cache
    /// (refilling it through `fetcher` when needed) and recomputes indicators per window.
    ///
    /// Fails without touching the store; the cache may have grown but stays consistent.
    pub fn build<F: CandleFetcher + ?Sized>(
        &self,
        store: &SeriesStore,
        cache: &mut FineGrainCache,
        fetcher: &mut F,
        at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let mut aligned: Vec<(TimeFrame, Alignment)> = Vec::with_capacity(self.timeframes.len());
        for &timeframe in &self.timeframes {
            let alignment = TimeframeAligner::locate(store.series(timeframe)?, at)?;
            aligned.push((timeframe, alignment));
        }

        // One refill per tick, from the oldest open period to now.
        let oldest_open = aligned
            .iter()
            .map(|(_, a)| a.closed_at)
            .filter(|closed_at| *closed_at < at)
            .min();
        if let Some(start) = oldest_open {
            cache.ensure_covered(fetcher, start, at)?;
        }

        let mut windows = Vec::with_capacity(aligned.len());
        for (timeframe, alignment) in aligned {
            let series = store.series(timeframe)?;
            let mut window = series.slice(alignment.closed_range(self.min_candles));
            let partial = PartialCandleAggregator::partial(cache, alignment.closed_at, at);
            let has_partial = partial.is_some();
            if let Some(candle) = partial {
                window.push(candle)?;
            }
            indicators::apply_all(&self.indicators, &mut window)?;

            tracing::debug!(
                %timeframe,
                rows = window.len(),
                has_partial,
                closed_at = %alignment.closed_at,
                "Built window"
            );
            windows.push(TimeframeWindow {
                series: window,
                has_partial,
            });
        }

        Ok(Snapshot { at, windows })
    }
}
