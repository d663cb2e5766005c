// Volume Weighted Average Price, cumulative from the first row of the series (no session reset).
use super::IndicatorCalculator;
use crate::error::Result;
use crate::models::{Column, Series};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vwap {
    name: String,
}

impl Vwap {
    pub fn new() -> Self {
        Self {
            name: "vwap".to_string(),
        }
    }
}

impl Default for Vwap {
    fn default() -> Self {
        Self::new()
    }
}

/// cumulative(typical price * volume) / cumulative(volume).
///
/// While the cumulative volume is still zero the value is undefined; afterwards a zero-volume
/// row carries the previous value forward.
pub fn volume_weighted_average(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Column {
    let mut cum_pv = 0.0;
    let mut cum_volume = 0.0;
    let mut last: Option<f64> = None;
    let mut degenerate = 0usize;

    let results = high
        .iter()
        .zip(low)
        .zip(close)
        .zip(volume)
        .map(|(((h, l), c), v)| {
            let typical = (h + l + c) / 3.0;
            cum_pv += typical * v;
            cum_volume += v;
            if cum_volume > 0.0 {
                last = Some(cum_pv / cum_volume);
            } else {
                degenerate += 1;
            }
            last
        })
        .collect();

    if degenerate > 0 {
        tracing::debug!(rows = degenerate, "VWAP rows without cumulative volume left undefined");
    }
    results
}

impl IndicatorCalculator for Vwap {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({})
    }

    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>> {
        let high = series.values("high")?;
        let low = series.values("low")?;
        let close = series.values("close")?;
        let volume = series.values("volume")?;
        Ok(vec![(
            self.name.clone(),
            volume_weighted_average(&high, &low, &close, &volume),
        )])
    }
}
