//! Bets Core - batch submission client for the lottery bets service
//!
//! This library streams one agency's bet records to the central server
//! over a single TCP connection:
//!
//! - Records read lazily from a named entry inside a zip archive
//! - Count-bounded batches with a packet-size admission check
//! - Explicit session state machine: stream, finalize, query, close
//! - Cooperative cancellation at safe boundaries only

pub mod batch;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod record;
pub mod source;
pub mod transport;

// Re-export commonly used types
pub use config::ClientConfig;
pub use engine::{ClientSession, SessionReport, SessionState};
pub use error::{CodecError, SourceError, TransportError};
pub use error::{Error, Result};
pub use record::{Record, RecordParser};
