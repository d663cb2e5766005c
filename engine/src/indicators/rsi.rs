// Relative Strength Index (RSI) indicator implementation
use super::IndicatorCalculator;
use crate::error::{EngineError, Result};
use crate::models::{Column, Series};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_LENGTH: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rsi {
    name: String,
    length: usize,
}

impl Rsi {
    pub fn new(length: usize) -> Self {
        let name = if length == DEFAULT_LENGTH {
            "rsi".to_string()
        } else {
            format!("rsi_{}", length)
        };
        Self { name, length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// RSI from simple rolling means of close-to-close gains and losses over `length` deltas.
///
/// The first `length` rows are undefined. A window without losses has no defined RS; it is
/// reported as 100 (all gains) instead of propagating a division by zero.
pub fn relative_strength(closes: &[f64], length: usize) -> Column {
    let mut results = vec![None; closes.len()];
    if length == 0 || closes.len() <= length {
        return results;
    }

    // deltas[i - 1] is the change into row i
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut degenerate = 0usize;

    for (row, slot) in results.iter_mut().enumerate().skip(length) {
        let window = &deltas[row - length..row];
        let gains: f64 = window.iter().filter(|d| **d > 0.0).sum();
        let losses: f64 = window.iter().filter(|d| **d < 0.0).map(|d| -d).sum();
        let avg_gain = gains / length as f64;
        let avg_loss = losses / length as f64;

        *slot = if avg_loss == 0.0 {
            degenerate += 1;
            Some(100.0)
        } else {
            let rs = avg_gain / avg_loss;
            Some(100.0 - (100.0 / (1.0 + rs)))
        };
    }

    if degenerate > 0 {
        tracing::debug!(rows = degenerate, length, "RSI windows without losses reported as 100");
    }
    results
}

impl IndicatorCalculator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "length": self.length })
    }

    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>> {
        if self.length == 0 {
            return Err(EngineError::IndicatorError("RSI length cannot be 0".to_string()));
        }
        let closes = series.values("close")?;
        Ok(vec![(self.name.clone(), relative_strength(&closes, self.length))])
    }
}
