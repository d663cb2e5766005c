use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV record for a fixed period, in the exchange kline layout.
///
/// `open_time` is the sort and lookup key. `close_time` is the last millisecond
/// of the period (`open_time + period - 1ms`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub taker_buy_base: f64,
    pub taker_buy_quote: f64,
}

impl Candle {
    /// Builds a candle spanning exactly one `timeframe` period starting at `open_time`.
    /// Volume-derived fields other than `volume` start at zero.
    pub fn new(
        open_time: DateTime<Utc>,
        timeframe: TimeFrame,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Candle {
            open_time,
            close_time: open_time + timeframe.duration() - Duration::milliseconds(1),
            open,
            high,
            low,
            close,
            volume,
            quote_volume: 0.0,
            trade_count: 0,
            taker_buy_base: 0.0,
            taker_buy_quote: 0.0,
        }
    }

    /// (High + Low + Close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn mid_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// True once the whole period lies strictly before `at`.
    pub fn is_closed_at(&self, at: DateTime<Utc>) -> bool {
        self.close_time < at
    }
}

/// Candle period. Variants are ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeFrame {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl TimeFrame {
    /// The resolution used for synthesizing in-progress candles.
    pub const FINEST: TimeFrame = TimeFrame::Minute1;

    pub fn minutes(&self) -> i64 {
        match self {
            TimeFrame::Minute1 => 1,
            TimeFrame::Minute5 => 5,
            TimeFrame::Minute15 => 15,
            TimeFrame::Minute30 => 30,
            TimeFrame::Hour1 => 60,
            TimeFrame::Hour4 => 4 * 60,
            TimeFrame::Day1 => 24 * 60,
            TimeFrame::Week1 => 7 * 24 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Interval label as used by the exchange and in table file names.
    pub fn label(&self) -> &'static str {
        match self {
            TimeFrame::Minute1 => "1m",
            TimeFrame::Minute5 => "5m",
            TimeFrame::Minute15 => "15m",
            TimeFrame::Minute30 => "30m",
            TimeFrame::Hour1 => "1h",
            TimeFrame::Hour4 => "4h",
            TimeFrame::Day1 => "1d",
            TimeFrame::Week1 => "1w",
        }
    }

    pub fn all() -> &'static [TimeFrame] {
        &[
            TimeFrame::Minute1,
            TimeFrame::Minute5,
            TimeFrame::Minute15,
            TimeFrame::Minute30,
            TimeFrame::Hour1,
            TimeFrame::Hour4,
            TimeFrame::Day1,
            TimeFrame::Week1,
        ]
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeFrame {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TimeFrame::all()
            .iter()
            .copied()
            .find(|tf| tf.label() == wanted)
            .ok_or_else(|| anyhow!("Unknown timeframe '{}'", s))
    }
}
