//! Count-bounded batch accumulator.

use crate::record::Record;
use tracing::debug;

/// An ordered group of records sent as one wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch within the session (0-based)
    pub sequence: u64,
    /// The records, in source order
    pub records: Vec<Record>,
    /// Whether this is the end-of-input flush
    pub is_final: bool,
}

impl Batch {
    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulator statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Records currently pending
    pub pending: usize,
    /// Records appended over the accumulator's lifetime
    pub total_records: u64,
    /// Batches handed out, including the final one
    pub batches_taken: u64,
}

/// Collects records until the batch size is reached.
///
/// `should_flush` holds exactly when the pending count equals the batch size.
/// The caller takes the batch before appending again, so the pending count
/// never exceeds it.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    pending: Vec<Record>,
    next_sequence: u64,
    total_records: u64,
    finished: bool,
}

impl BatchAccumulator {
    /// Create an accumulator. A `batch_size` of zero is clamped to one.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            next_sequence: 0,
            total_records: 0,
            finished: false,
        }
    }

    /// Configured flush threshold.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append a parsed record.
    pub fn append(&mut self, record: Record) {
        debug_assert!(!self.finished, "append after finish");
        self.pending.push(record);
        self.total_records += 1;
    }

    /// Whether the pending records form a full batch.
    pub fn should_flush(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the pending records as a batch and start a new one.
    pub fn take_batch(&mut self) -> Batch {
        self.cut(false)
    }

    /// Take the end-of-input batch. Yields `Some` exactly once, even when
    /// nothing is pending.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.cut(true))
    }

    /// Whether the final batch has been taken.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get accumulator statistics.
    pub fn stats(&self) -> AccumulatorStats {
        AccumulatorStats {
            pending: self.pending.len(),
            total_records: self.total_records,
            batches_taken: self.next_sequence,
        }
    }

    fn cut(&mut self, is_final: bool) -> Batch {
        let records = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        debug!(
            sequence,
            records = records.len(),
            is_final,
            "Batch cut"
        );

        Batch {
            sequence,
            records,
            is_final,
        }
    }
}
