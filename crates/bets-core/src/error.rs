//! Error types for the bets client library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! The server answering `{"type":"error"}` to a results query is NOT an error
//! here; that is a regular [`crate::codec::QueryOutcome`].

use thiserror::Error;

/// Result type alias for bets client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the bets client.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-related error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Record source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Invalid session state transition
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// IO error outside of an exchange (config files, archives)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is the dial failure that ends the process.
    pub fn is_fatal_connect(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Connect { .. }))
    }
}

/// Transport-specific errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to dial the server
    #[error("Connection failed to {address}: {message}")]
    Connect { address: String, message: String },

    /// Payload rejected by the client-side admission check; nothing was written
    #[error("Packet too large: {size} bytes exceeds limit of {max} bytes")]
    PacketTooLarge { size: usize, max: usize },

    /// Server reply exceeds the configured response limit
    #[error("Response too large: {size} bytes exceeds limit of {max} bytes")]
    ResponseTooLarge { size: usize, max: usize },

    /// Write or read failure mid-exchange
    #[error("IO failure during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// No response within the configured deadline
    #[error("Timed out after {timeout_ms}ms waiting for response")]
    Timeout { timeout_ms: u64 },

    /// Peer closed the connection, or it was already closed locally
    #[error("Connection closed")]
    Closed,
}

/// Wire codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Structured data could not be serialized
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Response is not parseable
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Response parsed but lacks a required field
    #[error("Response missing field '{0}'")]
    MissingField(&'static str),

    /// Length-prefixed frame is malformed
    #[error("Frame error: expected {expected} payload bytes, got {actual}")]
    Frame { expected: usize, actual: usize },
}

/// Record source errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Archive could not be opened
    #[error("Failed to open archive {path}: {message}")]
    ArchiveOpen { path: String, message: String },

    /// Named entry is not present in the container
    #[error("Entry '{entry}' not found in {container}")]
    EntryNotFound { container: String, entry: String },

    /// Reading a line failed
    #[error("Read failed: {0}")]
    Read(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<zip::result::ZipError> for SourceError {
    fn from(err: zip::result::ZipError) -> Self {
        SourceError::Read(err.to_string())
    }
}
