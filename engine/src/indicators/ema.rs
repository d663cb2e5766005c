// Exponential Moving Average (EMA) indicator implementation
use super::IndicatorCalculator;
use crate::error::{EngineError, Result};
use crate::models::{Column, Series};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ema {
    name: String,
    length: usize,
    source: String,
}

impl Ema {
    pub fn new(length: usize) -> Self {
        Self::with_source(length, "close")
    }

    /// EMA over any column of the series, e.g. another indicator's output.
    pub fn with_source(length: usize, source: &str) -> Self {
        let name = if source == "close" {
            format!("ema_{}", length)
        } else {
            format!("ema_{}_{}", length, source)
        };
        Self {
            name,
            length,
            source: source.to_string(),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Recursive EMA with smoothing factor `2 / (length + 1)`, seeded by the first defined value.
///
/// Undefined inputs produce undefined outputs and leave the running average untouched.
pub fn exponential_average(values: &[Option<f64>], length: usize) -> Column {
    let alpha = 2.0 / (length as f64 + 1.0);
    let mut previous: Option<f64> = None;

    values
        .iter()
        .map(|value| {
            let value = (*value)?;
            let ema = match previous {
                None => value,
                // Written as a correction so a constant input reproduces itself exactly.
                Some(prev) => prev + alpha * (value - prev),
            };
            previous = Some(ema);
            Some(ema)
        })
        .collect()
}

impl IndicatorCalculator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "length": self.length, "source": self.source })
    }

    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>> {
        if self.length == 0 {
            return Err(EngineError::IndicatorError("EMA length cannot be 0".to_string()));
        }
        let source = series.column(&self.source)?;
        Ok(vec![(self.name.clone(), exponential_average(&source, self.length))])
    }
}
