//! Session metrics.

mod session;

pub use session::{ErrorType, MetricsSummary, RoundTripHistogram, SessionMetrics};
