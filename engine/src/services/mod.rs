// Seams to the chart renderer and decision agent that consume snapshots.
pub mod levels;
pub mod pipeline;

use std::collections::BTreeMap;

use serde::Serialize;
use shared::models::TimeFrame;

use crate::error::Result;
use crate::models::TimeframeWindow;

pub use levels::extract_price_levels;
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};

/// A rendered chart for one timeframe window.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartImage {
    pub timeframe: TimeFrame,
    pub bytes: Vec<u8>,
}

/// Draws one window with its indicator columns, plus horizontal price levels.
pub trait ChartRenderer {
    fn render(&self, window: &TimeframeWindow, levels: &[f64]) -> Result<ChartImage>;
}

/// Optional structured context passed along with the charts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradingContext {
    /// Holdings valued in USD, keyed by asset.
    pub portfolio: BTreeMap<String, f64>,
    pub open_trades: Vec<String>,
    pub risk_reward: Option<f64>,
}

/// Reads rendered charts and answers with free text, loosely following
/// `<Short Term: BUY|SELL|NO_TRADE: ...>` tags.
pub trait DecisionAgent {
    fn analyze(&mut self, images: &[ChartImage], context: Option<&TradingContext>) -> Result<String>;
}
