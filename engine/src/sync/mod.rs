// Keeps every timeframe in step with simulated time.
pub mod aggregator;
pub mod aligner;
pub mod builder;
pub mod clock;
pub mod simulation;

pub use aggregator::PartialCandleAggregator;
pub use aligner::{Alignment, TimeframeAligner};
pub use builder::SnapshotBuilder;
pub use clock::SimulationClock;
pub use simulation::{default_start, Simulation};
