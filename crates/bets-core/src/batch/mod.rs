//! Batch accumulation.
//!
//! Parsed records are grouped into count-bounded batches. A batch is flushed
//! when it reaches the configured size, and once more at end of input with
//! whatever remains (possibly nothing).

mod accumulator;

pub use accumulator::{AccumulatorStats, Batch, BatchAccumulator};
