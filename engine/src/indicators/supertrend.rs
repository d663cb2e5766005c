// Supertrend: ATR bands around the mid price with a sequential trend-flip rule.
//
// Each row depends on the previous row's trend and final bands, so the computation is a fold
// over ordered rows. `SupertrendFold` yields one `SupertrendPoint` per row and exposes the carried
// `SupertrendState`, which lets a caller resume from any row without replaying the prefix.
use super::IndicatorCalculator;
use crate::error::{EngineError, Result};
use crate::models::{Column, Series};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_LENGTH: usize = 10;
pub const DEFAULT_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    pub fn as_f64(self) -> f64 {
        match self {
            Trend::Up => 1.0,
            Trend::Down => -1.0,
        }
    }
}

/// Wilder ATR accumulator. Row 0 has no previous close, so its true range is `high - low`;
/// the first ATR is the mean of the first `length` true ranges and appears on row `length - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct AtrState {
    prev_close: Option<f64>,
    warmup_sum: f64,
    warmup_count: usize,
    atr: Option<f64>,
}

impl AtrState {
    fn update(&mut self, high: f64, low: f64, close: f64, length: usize) -> Option<f64> {
        let true_range = match self.prev_close {
            Some(prev_close) => (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs()),
            None => high - low,
        };
        match self.atr {
            Some(atr) => {
                self.atr = Some((atr * (length as f64 - 1.0) + true_range) / length as f64);
            }
            None => {
                self.warmup_sum += true_range;
                self.warmup_count += 1;
                if self.warmup_count == length {
                    self.atr = Some(self.warmup_sum / length as f64);
                }
            }
        }
        self.prev_close = Some(close);
        self.atr
    }
}

/// Everything row `i + 1` needs from row `i`.
///
/// Only the band on the active side is kept (`final_lower` while up, `final_upper` while down);
/// the other is `None`, which is what makes it restart from the raw band after a flip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendState {
    pub trend: Trend,
    pub final_upper: Option<f64>,
    pub final_lower: Option<f64>,
    atr: AtrState,
}

impl Default for SupertrendState {
    fn default() -> Self {
        SupertrendState {
            trend: Trend::Up,
            final_upper: None,
            final_lower: None,
            atr: AtrState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub trend: Trend,
    pub atr: Option<f64>,
    pub final_upper: Option<f64>,
    pub final_lower: Option<f64>,
}

pub struct SupertrendFold<I> {
    rows: I,
    length: usize,
    multiplier: f64,
    state: SupertrendState,
}

impl<I> SupertrendFold<I> {
    /// State after the last row yielded so far.
    pub fn state(&self) -> SupertrendState {
        self.state
    }
}

impl<I> Iterator for SupertrendFold<I>
where
    I: Iterator<Item = (f64, f64, f64)>,
{
    type Item = SupertrendPoint;

    fn next(&mut self) -> Option<SupertrendPoint> {
        let (high, low, close) = self.rows.next()?;
        let prev = self.state;
        let mut atr_state = prev.atr;
        let atr = atr_state.update(high, low, close, self.length);

        let mid = (high + low) / 2.0;
        let mut upper = atr.map(|a| mid + self.multiplier * a);
        let mut lower = atr.map(|a| mid - self.multiplier * a);

        let trend = if prev.final_upper.is_some_and(|band| close > band) {
            Trend::Up
        } else if prev.final_lower.is_some_and(|band| close < band) {
            Trend::Down
        } else {
            // Trend holds: the active band may only tighten toward price.
            match (prev.trend, lower, prev.final_lower, upper, prev.final_upper) {
                (Trend::Up, Some(cur), Some(old), _, _) if cur < old => lower = Some(old),
                (Trend::Down, _, _, Some(cur), Some(old)) if cur > old => upper = Some(old),
                _ => {}
            }
            prev.trend
        };

        match trend {
            Trend::Up => upper = None,
            Trend::Down => lower = None,
        }

        self.state = SupertrendState {
            trend,
            final_upper: upper,
            final_lower: lower,
            atr: atr_state,
        };
        Some(SupertrendPoint {
            trend,
            atr,
            final_upper: upper,
            final_lower: lower,
        })
    }
}

/// Folds `(high, low, close)` rows in order, starting from `prior` (the state after the row
/// preceding the first one given) or from a fresh up-trend.
pub fn supertrend_fold<R>(
    rows: R,
    length: usize,
    multiplier: f64,
    prior: Option<SupertrendState>,
) -> SupertrendFold<R::IntoIter>
where
    R: IntoIterator<Item = (f64, f64, f64)>,
{
    SupertrendFold {
        rows: rows.into_iter(),
        length,
        multiplier,
        state: prior.unwrap_or_default(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Supertrend {
    name: String,
    length: usize,
    multiplier: f64,
}

impl Supertrend {
    pub fn new(length: usize, multiplier: f64) -> Self {
        let name = if length == DEFAULT_LENGTH && multiplier == DEFAULT_MULTIPLIER {
            "supertrend".to_string()
        } else {
            format!("supertrend_{}_{}", length, multiplier)
        };
        Self {
            name,
            length,
            multiplier,
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn column_suffix(&self) -> &str {
        self.name.strip_prefix("supertrend").unwrap_or_default()
    }
}

impl Default for Supertrend {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH, DEFAULT_MULTIPLIER)
    }
}

impl IndicatorCalculator for Supertrend {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "length": self.length, "multiplier": self.multiplier })
    }

    /// Produces `supertrend` (+1 up / -1 down), `final_lowerband` and `final_upperband`.
    /// All three are `None` until the ATR is defined.
    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>> {
        if self.length == 0 {
            return Err(EngineError::IndicatorError("Supertrend length cannot be 0".to_string()));
        }
        let high = series.values("high")?;
        let low = series.values("low")?;
        let close = series.values("close")?;

        let rows = high.into_iter().zip(low).zip(close).map(|((h, l), c)| (h, l, c));
        let mut direction = Vec::with_capacity(series.len());
        let mut lower = Vec::with_capacity(series.len());
        let mut upper = Vec::with_capacity(series.len());
        for point in supertrend_fold(rows, self.length, self.multiplier, None) {
            direction.push(point.atr.map(|_| point.trend.as_f64()));
            lower.push(point.final_lower);
            upper.push(point.final_upper);
        }

        let suffix = self.column_suffix();
        Ok(vec![
            (self.name.clone(), direction),
            (format!("final_lowerband{}", suffix), lower),
            (format!("final_upperband{}", suffix), upper),
        ])
    }
}
