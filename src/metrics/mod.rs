//! Account performance metrics.

mod performance;

pub use performance::{parse_amounts, PerformanceCalculator};
