// End-to-end replay over kline tables written to a temporary directory.
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use engine::config::EngineSettings;
use engine::data::{CsvCandleSource, KlineCsv, RetryPolicy, RetryingFetcher};
use engine::sync::Simulation;
use engine::EngineError;
use shared::models::{Candle, TimeFrame};
use shared::utils::parse_human_datetime;

const EPSILON: f64 = 1e-9;

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < EPSILON, "{} != {}", actual, expected);
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

// Minute m opens at 100 + m/2, closes a quarter higher, trades m + 1 units.
fn minute(m: i64) -> Candle {
    let open = 100.0 + m as f64 * 0.5;
    let mut c = Candle::new(t0() + Duration::minutes(m), TimeFrame::Minute1, open, open + 1.0, open - 1.0, open + 0.25, (m + 1) as f64);
    c.trade_count = 1;
    c
}

fn coarse(timeframe: TimeFrame, count: i64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let price = 90.0 + (i % 5) as f64;
            Candle::new(t0() + timeframe.duration() * i as i32, timeframe, price, price + 3.0, price - 3.0, price + 1.0, 50.0)
        })
        .collect()
}

fn write_tables(dir: &Path) {
    let source = CsvCandleSource::new(dir);
    KlineCsv::write_candles_to_csv(&source.table_path("SOLUSDT", TimeFrame::Minute1), &(0..8 * 60).map(minute).collect::<Vec<_>>()).unwrap();
    KlineCsv::write_candles_to_csv(&source.table_path("SOLUSDT", TimeFrame::Minute15), &coarse(TimeFrame::Minute15, 32)).unwrap();
    KlineCsv::write_candles_to_csv(&source.table_path("SOLUSDT", TimeFrame::Hour1), &coarse(TimeFrame::Hour1, 8)).unwrap();
}

fn settings(dir: &Path, current_time: &str, end_date: &str) -> EngineSettings {
    EngineSettings {
        symbol: "SOLUSDT".to_string(),
        timeframes: vec![TimeFrame::Minute15, TimeFrame::Hour1],
        from_date: t0(),
        end_date: parse_human_datetime(end_date).unwrap(),
        current_time: Some(parse_human_datetime(current_time).unwrap()),
        indicators: ["ema_3", "rsi_2", "vwap", "supertrend_2_1.5"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect(),
        min_candles: 4,
        time_increment_minutes: 5,
        base_path: dir.to_path_buf(),
        save_path: dir.join("cache"),
        persist_cache: true,
        ..EngineSettings::default()
    }
}

fn fetcher(dir: &Path) -> RetryingFetcher<CsvCandleSource> {
    RetryingFetcher::new(
        CsvCandleSource::new(dir),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 0,
        },
    )
}

#[test]
fn partial_hour_matches_hand_computed_fixture() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let settings = settings(dir.path(), "1 Jan 2024 05:30:00", "1 Jan 2024 05:30:00");
    let mut sim = Simulation::from_settings(&settings, fetcher(dir.path())).unwrap();

    let snapshot = sim.tick().unwrap().expect("one tick before the end");
    assert_eq!(snapshot.at, t0() + Duration::minutes(330));

    let h1 = snapshot.window(TimeFrame::Hour1).unwrap();
    assert_eq!(h1.closed().len(), 4);
    assert_eq!(h1.closed().last().unwrap().open_time, t0() + Duration::hours(4));
    let partial = h1.partial().expect("30 minutes into the hour");
    // Minutes 300..=329.
    assert_eq!(partial.open_time, t0() + Duration::hours(5));
    assert_eq!(partial.close_time, t0() + Duration::minutes(330) - Duration::milliseconds(1));
    assert_close(partial.open, 250.0);
    assert_close(partial.close, 264.75);
    assert_close(partial.high, 265.5);
    assert_close(partial.low, 249.0);
    // Sum of 301..=330.
    assert_close(partial.volume, 9465.0);
    assert_eq!(partial.trade_count, 30);

    // 05:30 is a 15m boundary: the window ends with the last closed candle.
    let m15 = snapshot.window(TimeFrame::Minute15).unwrap();
    assert!(!m15.has_partial);
    assert_eq!(m15.current().unwrap().open_time, t0() + Duration::minutes(315));

    for window in &snapshot.windows {
        for column in ["ema_3", "rsi_2", "vwap", "supertrend_2_1.5", "final_lowerband_2_1.5", "final_upperband_2_1.5"] {
            assert_eq!(window.masked(column).unwrap().len(), window.series.len(), "{}", column);
        }
    }

    assert!(sim.tick().unwrap().is_none());
    let persisted = KlineCsv::load_candles_from_csv(&settings.cache_path()).unwrap();
    assert_eq!(persisted.len(), 31);
}

#[test]
fn replay_grows_partial_until_the_hour_closes() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let settings = settings(dir.path(), "1 Jan 2024 05:05:00", "1 Jan 2024 06:00:00");
    let mut sim = Simulation::from_settings(&settings, fetcher(dir.path())).unwrap();

    let mut volumes = Vec::new();
    let ticks = sim
        .run(|snapshot| {
            let h1 = snapshot.window(TimeFrame::Hour1).unwrap();
            volumes.push(h1.partial().map(|c| c.volume));
            Ok(())
        })
        .unwrap();

    assert_eq!(ticks, 12);
    let (last, growing) = volumes.split_last().unwrap();
    // 06:00 closes the hour; no fine candle of the new hour has closed yet.
    assert_eq!(*last, None);
    let growing: Vec<f64> = growing.iter().map(|v| v.expect("partial inside the hour")).collect();
    assert!(growing.windows(2).all(|w| w[1] > w[0]));

    let cached = sim.cache().candles();
    assert!(cached.windows(2).all(|w| w[0].open_time < w[1].open_time));
    assert_eq!(cached.first().unwrap().open_time, t0() + Duration::hours(5));
}

#[test]
fn query_before_history_is_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let settings = settings(dir.path(), "31 Dec 2023 23:00:00", "1 Jan 2024 01:00:00");
    let mut sim = Simulation::from_settings(&settings, fetcher(dir.path())).unwrap();

    let before = sim.clock().now();
    assert!(matches!(sim.tick(), Err(EngineError::OutOfRange { .. })));
    assert_eq!(sim.clock().now(), before);
}
