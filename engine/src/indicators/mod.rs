// Technical indicators module
pub mod ema;
pub mod rsi;
pub mod supertrend;
pub mod vwap;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::models::{Column, Series};

pub use ema::Ema;
pub use rsi::Rsi;
pub use supertrend::{Supertrend, SupertrendPoint, SupertrendState, Trend};
pub use vwap::Vwap;

// Common trait for all indicators
pub trait IndicatorCalculator: Send + Sync {
    fn name(&self) -> &str;
    fn parameters(&self) -> Value; // Parameters used for this indicator instance

    /// Computes the indicator's output columns over every row of `series`.
    /// Rows inside the warm-up period are `None`.
    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>>;

    fn apply(&self, series: &mut Series) -> Result<()> {
        for (name, values) in self.calculate(series)? {
            series.set_indicator(&name, values)?;
        }
        Ok(())
    }
}

/// The closed set of indicators the engine knows how to compute.
///
/// Configured as strings (`"ema_20"`, `"rsi"`, `"vwap"`, `"supertrend"`, ...) and parsed once
/// when settings are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Indicator {
    Ema(Ema),
    Rsi(Rsi),
    Vwap(Vwap),
    Supertrend(Supertrend),
}

impl Indicator {
    fn calculator(&self) -> &dyn IndicatorCalculator {
        match self {
            Indicator::Ema(inner) => inner,
            Indicator::Rsi(inner) => inner,
            Indicator::Vwap(inner) => inner,
            Indicator::Supertrend(inner) => inner,
        }
    }
}

impl IndicatorCalculator for Indicator {
    fn name(&self) -> &str {
        self.calculator().name()
    }

    fn parameters(&self) -> Value {
        self.calculator().parameters()
    }

    fn calculate(&self, series: &Series) -> Result<Vec<(String, Column)>> {
        self.calculator().calculate(series)
    }
}

/// Applies `indicators` in order, so later entries may read columns produced by earlier ones.
pub fn apply_all(indicators: &[Indicator], series: &mut Series) -> Result<()> {
    for indicator in indicators {
        indicator.apply(series)?;
    }
    Ok(())
}

fn parse_length(label: &str, raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(EngineError::ConfigError(format!(
            "Indicator '{}' needs a positive integer length, got '{}'",
            label, raw
        ))),
        Ok(length) => Ok(length),
    }
}

impl FromStr for Indicator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        let mut parts = label.splitn(2, '_');
        let kind = parts.next().unwrap_or_default();
        let rest = parts.next();

        match (kind, rest) {
            ("ema", Some(rest)) => {
                let (length, source) = match rest.split_once(':') {
                    Some((length, source)) => (length, source),
                    None => (rest, "close"),
                };
                Ok(Indicator::Ema(Ema::with_source(parse_length(&label, length)?, source)))
            }
            ("rsi", None) => Ok(Indicator::Rsi(Rsi::new(rsi::DEFAULT_LENGTH))),
            ("rsi", Some(length)) => Ok(Indicator::Rsi(Rsi::new(parse_length(&label, length)?))),
            ("vwap", None) => Ok(Indicator::Vwap(Vwap::new())),
            ("supertrend", None) => Ok(Indicator::Supertrend(Supertrend::default())),
            ("supertrend", Some(rest)) => {
                let (length, multiplier) = rest.split_once('_').ok_or_else(|| {
                    EngineError::ConfigError(format!(
                        "Indicator '{}' must look like supertrend_<length>_<multiplier>",
                        label
                    ))
                })?;
                let multiplier = multiplier
                    .parse::<f64>()
                    .ok()
                    .filter(|m| m.is_finite() && *m > 0.0)
                    .ok_or_else(|| {
                        EngineError::ConfigError(format!(
                            "Indicator '{}' has an invalid multiplier '{}'",
                            label, multiplier
                        ))
                    })?;
                Ok(Indicator::Supertrend(Supertrend::new(parse_length(&label, length)?, multiplier)))
            }
            _ => Err(EngineError::ConfigError(format!("Unknown indicator '{}'", s))),
        }
    }
}

impl TryFrom<String> for Indicator {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Indicator> for String {
    fn from(indicator: Indicator) -> Self {
        indicator.to_string()
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Ema(ema) if ema.source() == "close" => write!(f, "ema_{}", ema.length()),
            Indicator::Ema(ema) => write!(f, "ema_{}:{}", ema.length(), ema.source()),
            Indicator::Rsi(rsi) if rsi.length() == rsi::DEFAULT_LENGTH => f.write_str("rsi"),
            Indicator::Rsi(rsi) => write!(f, "rsi_{}", rsi.length()),
            Indicator::Vwap(_) => f.write_str("vwap"),
            Indicator::Supertrend(st) if *st == Supertrend::default() => f.write_str("supertrend"),
            Indicator::Supertrend(st) => write!(f, "supertrend_{}_{}", st.length(), st.multiplier()),
        }
    }
}
