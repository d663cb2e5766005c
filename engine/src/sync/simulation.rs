// Replay session: owns the history, the fine cache and the clock for one run.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use shared::models::TimeFrame;
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

use super::builder::SnapshotBuilder;
use super::clock::SimulationClock;
use crate::config::EngineSettings;
use crate::data::{CandleFetcher, FineGrainCache, SeriesStore};
use crate::error::{EngineError, Result};
use crate::models::Snapshot;

pub struct Simulation<F> {
    run_id: Uuid,
    span: Span,
    store: SeriesStore,
    cache: FineGrainCache,
    fetcher: F,
    builder: SnapshotBuilder,
    clock: SimulationClock,
    cache_output: Option<PathBuf>,
}

impl<F: CandleFetcher> Simulation<F> {
    pub fn new(store: SeriesStore, fetcher: F, builder: SnapshotBuilder, clock: SimulationClock) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("replay", run_id = %run_id, symbol = %store.symbol());
        Simulation {
            run_id,
            span,
            cache: FineGrainCache::new(store.symbol()),
            store,
            fetcher,
            builder,
            clock,
            cache_output: None,
        }
    }

    /// Loads the history for every configured timeframe and positions the clock.
    pub fn from_settings(settings: &EngineSettings, mut fetcher: F) -> Result<Self> {
        settings.validate()?;
        let (from, end) = (settings.from_date, settings.end_date);

        let mut store = SeriesStore::new(&settings.symbol);
        store.load_from_fetcher(&mut fetcher, &settings.timeframes, from, end)?;

        let start = match settings.current_time {
            Some(start) => start,
            None => default_start(&store, &settings.timeframes, settings.min_candles)?,
        };
        let builder = SnapshotBuilder::new(
            settings.timeframes.clone(),
            settings.indicators.clone(),
            settings.min_candles,
        );
        let clock = SimulationClock::new(start, settings.step(), end);

        let simulation = Simulation::new(store, fetcher, builder, clock);
        Ok(if settings.persist_cache {
            simulation.with_cache_output(settings.cache_path())
        } else {
            simulation
        })
    }

    /// Writes the fine cache to `path` after every successful tick.
    pub fn with_cache_output(mut self, path: PathBuf) -> Self {
        self.cache_output = Some(path);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn cache(&self) -> &FineGrainCache {
        &self.cache
    }

    /// Builds the snapshot at the current instant and advances the clock. A failed build
    /// leaves the clock where it was, so the same instant is retried on the next call.
    /// `Ok(None)` once the clock has passed the end of the run.
    pub fn tick(&mut self) -> Result<Option<Snapshot>> {
        let span = self.span.clone();
        let _enter = span.enter();

        let Some(at) = self.clock.current() else {
            return Ok(None);
        };
        let snapshot = self
            .builder
            .build(&self.store, &mut self.cache, &mut self.fetcher, at)
            .and_then(|snapshot| {
                if let Some(path) = &self.cache_output {
                    self.cache.persist(path)?;
                }
                Ok(snapshot)
            })
            .map_err(|e| {
                error!(%at, error = %e, "Tick failed");
                e
            })?;

        tracing::debug!(%at, windows = snapshot.windows.len(), cached = self.cache.len(), "Tick complete");
        self.clock.advance();
        Ok(Some(snapshot))
    }

    /// Ticks until the clock passes the end of the run, handing each snapshot to `sink`.
    /// Returns the number of snapshots built.
    pub fn run<S>(&mut self, mut sink: S) -> Result<usize>
    where
        S: FnMut(&Snapshot) -> Result<()>,
    {
        self.span.in_scope(|| {
            info!(start = %self.clock.now(), end = %self.clock.end(), step = %self.clock.step(), "Replay started")
        });
        let mut ticks = 0;
        while let Some(snapshot) = self.tick()? {
            sink(&snapshot)?;
            ticks += 1;
        }
        self.span
            .in_scope(|| info!(ticks, cached = self.cache.len(), "Replay finished"));
        Ok(ticks)
    }
}

/// First instant at which the coarsest timeframe already has `min_candles` closed candles
/// before it: the open time of its candle at index `min_candles + 1`.
pub fn default_start(store: &SeriesStore, timeframes: &[TimeFrame], min_candles: usize) -> Result<DateTime<Utc>> {
    let coarsest = timeframes
        .iter()
        .copied()
        .max()
        .ok_or_else(|| EngineError::ConfigError("timeframes must not be empty".to_string()))?;
    let series = store.series(coarsest)?;
    series
        .candles()
        .get(min_candles + 1)
        .map(|c| c.open_time)
        .ok_or_else(|| {
            EngineError::MarketDataError(format!(
                "{} {} history has {} candles, {} needed to fill a window",
                store.symbol(),
                coarsest,
                series.len(),
                min_candles + 2
            ))
        })
}
