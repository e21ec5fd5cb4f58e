//! Newline-delimited JSON codec.
//!
//! # Messages
//!
//! ```text
//! batch:    [{"nombre":..,"apellido":..,"doc":..,"nacimiento":..,"numero":..,"agencia":..}, ..]\n
//! control:  {"type":"ready"|"consultar_ganadores","agencia":..}\n
//! response: {"type":..,"ganadores":..}\n
//! ```
//!
//! Compact JSON never contains a raw newline, so `\n` is a safe terminator in
//! both directions.

use crate::batch::Batch;
use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TERMINATOR: u8 = b'\n';

/// Response `type` that marks a query as not servable yet.
const ERROR_TYPE: &str = "error";

/// A non-record message signaling a protocol phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlRequest {
    /// No more batches will follow
    #[serde(rename = "ready")]
    Ready {
        /// Sending agency
        agencia: String,
    },
    /// Ask for the aggregate outcome
    #[serde(rename = "consultar_ganadores")]
    QueryResults {
        /// Sending agency
        agencia: String,
    },
}

impl ControlRequest {
    /// Done-sending notification for `agency`.
    pub fn ready(agency: impl Into<String>) -> Self {
        ControlRequest::Ready {
            agencia: agency.into(),
        }
    }

    /// Results query for `agency`.
    pub fn query_results(agency: impl Into<String>) -> Self {
        ControlRequest::QueryResults {
            agencia: agency.into(),
        }
    }

    /// Wire name of the request type.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlRequest::Ready { .. } => "ready",
            ControlRequest::QueryResults { .. } => "consultar_ganadores",
        }
    }
}

/// Server acknowledgement. Opaque; kept only for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement(pub String);

impl std::fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a `consultar_ganadores` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The server answered with the aggregate result
    Ready {
        /// Winner count (or listing), as text
        winners: String,
    },
    /// The server answered `type == "error"`: results not available yet
    NotReady {
        /// Raw response, for logging
        message: String,
    },
}

impl QueryOutcome {
    /// Whether results were available.
    pub fn is_ready(&self) -> bool {
        matches!(self, QueryOutcome::Ready { .. })
    }

    /// The winners field, when available.
    pub fn winners(&self) -> Option<&str> {
        match self {
            QueryOutcome::Ready { winners } => Some(winners),
            QueryOutcome::NotReady { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    ganadores: Option<Value>,
}

/// Serialize a batch as a JSON array, newline-terminated.
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>> {
    encode(&batch.records)
}

/// Serialize a control request, newline-terminated.
pub fn encode_control(request: &ControlRequest) -> Result<Vec<u8>> {
    encode(request)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    bytes.push(TERMINATOR);
    Ok(bytes)
}

/// Interpret an acknowledgement. Never fails.
pub fn decode_ack(bytes: &[u8]) -> Acknowledgement {
    Acknowledgement(String::from_utf8_lossy(bytes).trim_end().to_string())
}

/// Classify the response to a results query.
///
/// `{"type":"error"}` is a regular negative outcome. Anything that is not a
/// JSON object with a `type`, or a non-error response without `ganadores`,
/// is a [`CodecError`].
pub fn decode_query_response(bytes: &[u8]) -> Result<QueryOutcome> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .trim_end();

    let raw: RawResponse =
        serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))?;

    let kind = raw.kind.ok_or(CodecError::MissingField("type"))?;
    if kind == ERROR_TYPE {
        return Ok(QueryOutcome::NotReady {
            message: text.to_string(),
        });
    }

    let winners = match raw.ganadores {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => return Err(CodecError::MissingField("ganadores").into()),
        Some(other) => other.to_string(),
    };

    Ok(QueryOutcome::Ready { winners })
}
