//! Window metrics and observation building

mod aggregator;
mod features;

pub use aggregator::WindowAggregator;
pub use features::{normalize, ObservationBuilder, RawFeatures};
