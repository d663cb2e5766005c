// Engine-side data models. Candle and TimeFrame live in the `shared` crate.
pub mod series;
pub mod snapshot;

pub use series::{Column, Series, BASE_COLUMNS};
pub use snapshot::{Snapshot, TimeframeWindow};
