// Engine library root: multi-timeframe synchronization and indicator engine.

pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod models;
pub mod services;
pub mod sync;

pub use error::{EngineError, Result};
