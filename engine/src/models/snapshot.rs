// Per-tick multi-timeframe view handed to renderers and decision agents.
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::models::{Candle, TimeFrame};

use super::series::Series;
use crate::error::Result;

/// The last closed candles of one timeframe, optionally followed by a synthetic
/// in-progress candle, with indicator columns computed over exactly these rows.
#[derive(Debug, Clone, Serialize)]
pub struct TimeframeWindow {
    pub series: Series,
    /// True when the final row is a synthesized partial candle rather than a closed one.
    pub has_partial: bool,
}

impl TimeframeWindow {
    pub fn timeframe(&self) -> TimeFrame {
        self.series.timeframe()
    }

    pub fn closed(&self) -> &[Candle] {
        let candles = self.series.candles();
        if self.has_partial {
            &candles[..candles.len() - 1]
        } else {
            candles
        }
    }

    pub fn partial(&self) -> Option<&Candle> {
        if self.has_partial {
            self.series.candles().last()
        } else {
            None
        }
    }

    /// The most recent row, partial or closed.
    pub fn current(&self) -> Option<&Candle> {
        self.series.candles().last()
    }

    /// Column values with undefined rows replaced by NaN, for consumers that plot raw floats.
    pub fn masked(&self, column: &str) -> Result<Vec<f64>> {
        Ok(self
            .series
            .column(column)?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub at: DateTime<Utc>,
    /// One window per configured timeframe, in configuration order.
    pub windows: Vec<TimeframeWindow>,
}

impl Snapshot {
    pub fn window(&self, timeframe: TimeFrame) -> Option<&TimeframeWindow> {
        self.windows.iter().find(|w| w.timeframe() == timeframe)
    }
}
