//! Counters and round-trip histogram for one client session.

use crate::error::{Error, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for request round trips.
const ROUND_TRIP_BUCKETS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

/// Error categories for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Dial, IO, timeout and closed-connection failures
    Transport,
    /// Payloads rejected by the admission check
    PacketTooLarge,
    /// Encode/decode failures
    Codec,
    /// Record source failures
    Source,
    /// Everything else
    Other,
}

impl ErrorType {
    /// Categorize an error.
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Transport(TransportError::PacketTooLarge { .. }) => ErrorType::PacketTooLarge,
            Error::Transport(_) => ErrorType::Transport,
            Error::Codec(_) => ErrorType::Codec,
            Error::Source(_) => ErrorType::Source,
            _ => ErrorType::Other,
        }
    }

    /// Label used in log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::PacketTooLarge => "packet_too_large",
            ErrorType::Codec => "codec",
            ErrorType::Source => "source",
            ErrorType::Other => "other",
        }
    }
}

/// Session metrics with counters and a round-trip histogram.
pub struct SessionMetrics {
    // === COUNTERS ===
    /// Records read from the source
    records_read: AtomicU64,

    /// Records that went out inside acknowledged batches
    records_sent: AtomicU64,

    /// Batches acknowledged by the server
    batches_sent: AtomicU64,

    /// Control requests acknowledged by the server
    control_requests: AtomicU64,

    /// Bytes written to the connection
    bytes_sent: AtomicU64,

    /// Errors by type
    errors_transport: AtomicU64,
    errors_packet_too_large: AtomicU64,
    errors_codec: AtomicU64,
    errors_source: AtomicU64,
    errors_other: AtomicU64,

    // === HISTOGRAM: request round trip ===
    round_trip_sum_ms: AtomicU64,
    round_trip_count: AtomicU64,
    /// Buckets: [1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s, +Inf]
    round_trip_buckets: [AtomicU64; 8],
}

/// Point-in-time copy of the counters, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub records_read: u64,
    pub records_sent: u64,
    pub batches_sent: u64,
    pub control_requests: u64,
    pub bytes_sent: u64,
    pub errors_total: u64,
}

/// Round-trip histogram snapshot.
#[derive(Debug, Clone)]
pub struct RoundTripHistogram {
    /// Sum of all observations in seconds
    pub sum_seconds: f64,
    /// Number of observations
    pub count: u64,
    /// Cumulative `(upper bound in seconds, count)` pairs
    pub buckets: [(f64, u64); 7],
    /// Observations in the +Inf bucket
    pub inf_bucket: u64,
}

impl SessionMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            records_read: AtomicU64::new(0),
            records_sent: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            control_requests: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            errors_transport: AtomicU64::new(0),
            errors_packet_too_large: AtomicU64::new(0),
            errors_codec: AtomicU64::new(0),
            errors_source: AtomicU64::new(0),
            errors_other: AtomicU64::new(0),
            round_trip_sum_ms: AtomicU64::new(0),
            round_trip_count: AtomicU64::new(0),
            round_trip_buckets: Default::default(),
        }
    }

    // === COUNTER RECORDING ===

    /// Record a record read from the source.
    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledged batch.
    pub fn record_batch(&self, records: usize, bytes: usize, round_trip: Duration) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.records_sent
            .fetch_add(records as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.observe_round_trip(round_trip);
    }

    /// Record an acknowledged control request.
    pub fn record_control(&self, bytes: usize, round_trip: Duration) {
        self.control_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.observe_round_trip(round_trip);
    }

    /// Record an error under its category.
    pub fn record_error(&self, error: &Error) {
        let counter = match ErrorType::of(error) {
            ErrorType::Transport => &self.errors_transport,
            ErrorType::PacketTooLarge => &self.errors_packet_too_large,
            ErrorType::Codec => &self.errors_codec,
            ErrorType::Source => &self.errors_source,
            ErrorType::Other => &self.errors_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_round_trip(&self, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        self.round_trip_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.round_trip_count.fetch_add(1, Ordering::Relaxed);

        // Buckets are cumulative (le)
        for (i, &bucket_ms) in ROUND_TRIP_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= bucket_ms {
                self.round_trip_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.round_trip_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    // === GETTERS ===

    /// Get records read from the source.
    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    /// Get records sent in acknowledged batches.
    pub fn records_sent(&self) -> u64 {
        self.records_sent.load(Ordering::Relaxed)
    }

    /// Get acknowledged batches.
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Get bytes written.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Get error count by type.
    pub fn errors_by_type(&self, error_type: ErrorType) -> u64 {
        match error_type {
            ErrorType::Transport => self.errors_transport.load(Ordering::Relaxed),
            ErrorType::PacketTooLarge => self.errors_packet_too_large.load(Ordering::Relaxed),
            ErrorType::Codec => self.errors_codec.load(Ordering::Relaxed),
            ErrorType::Source => self.errors_source.load(Ordering::Relaxed),
            ErrorType::Other => self.errors_other.load(Ordering::Relaxed),
        }
    }

    /// Get total errors.
    pub fn errors_total(&self) -> u64 {
        [
            ErrorType::Transport,
            ErrorType::PacketTooLarge,
            ErrorType::Codec,
            ErrorType::Source,
            ErrorType::Other,
        ]
        .iter()
        .map(|t| self.errors_by_type(*t))
        .sum()
    }

    /// Snapshot the counters.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            records_read: self.records_read(),
            records_sent: self.records_sent(),
            batches_sent: self.batches_sent(),
            control_requests: self.control_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent(),
            errors_total: self.errors_total(),
        }
    }

    /// Snapshot the round-trip histogram.
    pub fn round_trip_histogram(&self) -> RoundTripHistogram {
        let bucket = |i: usize| self.round_trip_buckets[i].load(Ordering::Relaxed);
        RoundTripHistogram {
            sum_seconds: self.round_trip_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            count: self.round_trip_count.load(Ordering::Relaxed),
            buckets: [
                (0.001, bucket(0)),
                (0.005, bucket(1)),
                (0.01, bucket(2)),
                (0.05, bucket(3)),
                (0.1, bucket(4)),
                (0.5, bucket(5)),
                (1.0, bucket(6)),
            ],
            inf_bucket: bucket(7),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
