// Snapshot -> charts -> agent text -> price levels.
use shared::models::TimeFrame;

use super::{extract_price_levels, ChartImage, ChartRenderer, DecisionAgent, TradingContext};
use crate::error::{EngineError, Result};
use crate::models::Snapshot;

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub text: String,
    pub levels: Vec<f64>,
    /// The overlay timeframe re-rendered with `levels`, when one is configured and present.
    pub annotated: Option<ChartImage>,
}

pub struct AnalysisPipeline<R, A> {
    renderer: R,
    agent: A,
    overlay_timeframe: Option<TimeFrame>,
}

impl<R: ChartRenderer, A: DecisionAgent> AnalysisPipeline<R, A> {
    pub fn new(renderer: R, agent: A) -> Self {
        AnalysisPipeline {
            renderer,
            agent,
            overlay_timeframe: None,
        }
    }

    /// Re-render this timeframe with the extracted levels drawn on it.
    pub fn with_overlay(mut self, timeframe: TimeFrame) -> Self {
        self.overlay_timeframe = Some(timeframe);
        self
    }

    pub fn run(&mut self, snapshot: &Snapshot, context: Option<&TradingContext>) -> Result<AnalysisOutcome> {
        if snapshot.windows.is_empty() {
            return Err(EngineError::MarketDataError(format!(
                "Snapshot at {} has no windows to render",
                snapshot.at
            )));
        }
        let images = snapshot
            .windows
            .iter()
            .map(|window| self.renderer.render(window, &[]))
            .collect::<Result<Vec<_>>>()?;

        let text = self.agent.analyze(&images, context)?;
        let levels = extract_price_levels(&text);
        tracing::debug!(at = %snapshot.at, charts = images.len(), levels = levels.len(), "Agent analysis received");

        let annotated = match self.overlay_timeframe.and_then(|tf| snapshot.window(tf)) {
            Some(window) if !levels.is_empty() => Some(self.renderer.render(window, &levels)?),
            _ => None,
        };
        Ok(AnalysisOutcome { text, levels, annotated })
    }
}
