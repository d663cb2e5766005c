// Locates the last candle of a timeframe visible at a query time.
use chrono::{DateTime, Utc};
use shared::models::Candle;

use crate::error::{EngineError, Result};
use crate::models::Series;

/// Position of a query time inside one timeframe series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Index of the last candle whose open time is at or before the query time.
    pub index: usize,
    /// Open time of that candle: every candle before it has fully closed at the query time,
    /// and the in-progress period starts here.
    pub closed_at: DateTime<Utc>,
}

impl Alignment {
    /// Rows before `index`, i.e. candles closed at the query time, in series order.
    pub fn closed_range(&self, min_candles: usize) -> std::ops::Range<usize> {
        self.index.saturating_sub(min_candles)..self.index
    }
}

pub struct TimeframeAligner;

impl TimeframeAligner {
    /// Binary search for the last candle with `open_time <= at`. Open times are unique, so the
    /// result is unambiguous; if they were not, the later index would win.
    pub fn locate(series: &Series, at: DateTime<Utc>) -> Result<Alignment> {
        let index = Self::last_at_or_before(series.candles(), at).ok_or_else(|| EngineError::OutOfRange {
            timeframe: series.timeframe(),
            at,
            earliest: series
                .first_open_time()
                .map_or_else(|| "empty series".to_string(), |t| t.to_string()),
        })?;
        Ok(Alignment {
            index,
            closed_at: series.candles()[index].open_time,
        })
    }

    fn last_at_or_before(candles: &[Candle], at: DateTime<Utc>) -> Option<usize> {
        candles.partition_point(|c| c.open_time <= at).checked_sub(1)
    }
}
