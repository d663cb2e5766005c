// Market data layer: kline tables, per-timeframe series, fetch collaborators and the fine cache.
pub mod csv_parser;
pub mod fetcher;
pub mod fine_cache;
pub mod market_data;

pub use csv_parser::KlineCsv;
pub use fetcher::{CandleFetcher, CsvCandleSource, RetryPolicy, RetryingFetcher};
pub use fine_cache::FineGrainCache;
pub use market_data::SeriesStore;
