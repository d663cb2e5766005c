// Ordered candle series for one (symbol, timeframe) pair, with indicator columns
// aligned positionally to the candles.
use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::models::{Candle, TimeFrame};

use crate::error::{EngineError, Result};

/// Columns derived directly from the candles. Anything else is looked up in the indicator map.
pub const BASE_COLUMNS: [&str; 9] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "quote_volume",
    "trade_count",
    "taker_buy_base",
    "taker_buy_quote",
];

/// A column value; `None` marks rows an indicator cannot define yet (warm-up).
pub type Column = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    symbol: String,
    timeframe: TimeFrame,
    candles: Vec<Candle>,
    indicators: BTreeMap<String, Column>,
}

impl Series {
    pub fn new(symbol: &str, timeframe: TimeFrame) -> Self {
        Series {
            symbol: symbol.to_string(),
            timeframe,
            candles: Vec::new(),
            indicators: BTreeMap::new(),
        }
    }

    /// Builds a series from candles that are already strictly increasing by open time.
    pub fn from_candles(symbol: &str, timeframe: TimeFrame, candles: Vec<Candle>) -> Result<Self> {
        if let Some(pos) = candles.windows(2).position(|w| w[0].open_time >= w[1].open_time) {
            return Err(EngineError::MarketDataError(format!(
                "{} {} candles are not strictly increasing at row {} ({})",
                symbol,
                timeframe,
                pos + 1,
                candles[pos + 1].open_time
            )));
        }
        Ok(Series {
            symbol: symbol.to_string(),
            timeframe,
            candles,
            indicators: BTreeMap::new(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
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

    pub fn first_open_time(&self) -> Option<DateTime<Utc>> {
        self.candles.first().map(|c| c.open_time)
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.open_time)
    }

    /// Appends a candle newer than every existing one. Indicator columns are padded with
    /// `None` so they keep the candle count; they must be recomputed to cover the new row.
    pub fn push(&mut self, candle: Candle) -> Result<()> {
        if let Some(last) = self.last_open_time() {
            if candle.open_time <= last {
                return Err(EngineError::MarketDataError(format!(
                    "Candle at {} is not newer than the last {} candle ({})",
                    candle.open_time, self.timeframe, last
                )));
            }
        }
        self.candles.push(candle);
        for values in self.indicators.values_mut() {
            values.push(None);
        }
        Ok(())
    }

    /// Resolves a base column from the candles or an indicator column by name.
    pub fn column(&self, name: &str) -> Result<Column> {
        let pick: fn(&Candle) -> f64 = match name {
            "open" => |c: &Candle| c.open,
            "high" => |c: &Candle| c.high,
            "low" => |c: &Candle| c.low,
            "close" => |c: &Candle| c.close,
            "volume" => |c: &Candle| c.volume,
            "quote_volume" => |c: &Candle| c.quote_volume,
            "trade_count" => |c: &Candle| c.trade_count as f64,
            "taker_buy_base" => |c: &Candle| c.taker_buy_base,
            "taker_buy_quote" => |c: &Candle| c.taker_buy_quote,
            _ => {
                return self
                    .indicators
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EngineError::missing_column(name))
            }
        };
        Ok(self.candles.iter().map(|c| Some(pick(c))).collect())
    }

    /// Like [`Series::column`] for base columns only, without the `Option` wrapping.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        if !BASE_COLUMNS.contains(&name) {
            return Err(EngineError::missing_column(name));
        }
        Ok(self.column(name)?.into_iter().flatten().collect())
    }

    pub fn indicator(&self, name: &str) -> Option<&[Option<f64>]> {
        self.indicators.get(name).map(Vec::as_slice)
    }

    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        self.indicators.keys().map(String::as_str)
    }

    /// Stores an indicator column. Its length must match the candle count.
    pub fn set_indicator(&mut self, name: &str, values: Column) -> Result<()> {
        if BASE_COLUMNS.contains(&name) {
            return Err(EngineError::IndicatorError(format!(
                "Indicator name '{}' shadows a base column",
                name
            )));
        }
        if values.len() != self.candles.len() {
            return Err(EngineError::IndicatorError(format!(
                "Indicator '{}' has {} values for {} candles",
                name,
                values.len(),
                self.candles.len()
            )));
        }
        self.indicators.insert(name.to_string(), values);
        Ok(())
    }

    /// A new series over `range`. Indicator columns are sliced along with the candles.
    pub fn slice(&self, range: Range<usize>) -> Series {
        Series {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candles: self.candles[range.clone()].to_vec(),
            indicators: self
                .indicators
                .iter()
                .map(|(name, values)| (name.clone(), values[range.clone()].to_vec()))
                .collect(),
        }
    }
}
