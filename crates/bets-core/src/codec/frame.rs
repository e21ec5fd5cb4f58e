//! Length-prefixed single-record framing.
//!
//! # Frame Format
//!
//! ```text
//! +------------------+
//! | length (4)       |  u32 big-endian, number of payload bytes
//! +------------------+
//! | payload          |  UTF-8, comma-joined fields
//! | (variable)       |
//! +------------------+
//! ```
//!
//! Request payload fields, in order:
//! `status, extra, agencia, apellido, nombre, documento, nacimiento, numero`.
//! `status` and `extra` are reserved and always `"0"`. Field values must not
//! contain the field separator.
//!
//! The server replies with a frame of the same shape whose payload is
//! `status,result,...` terminated by `\n`.

use crate::error::{CodecError, Result};
use crate::record::Record;

/// Size of the length header in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

const SEPARATOR: char = ',';
const RESERVED: &str = "0";

/// A record laid out for the framed protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedRecord {
    fields: [String; 8],
}

impl FramedRecord {
    /// Lay out a record. Absent fields become empty strings.
    pub fn from_record(record: &Record) -> Self {
        let field = |f: &Option<String>| f.clone().unwrap_or_default();
        Self {
            fields: [
                RESERVED.to_string(),
                RESERVED.to_string(),
                record.agencia.clone(),
                field(&record.apellido),
                field(&record.nombre),
                field(&record.doc),
                field(&record.nacimiento),
                field(&record.numero),
            ],
        }
    }

    /// The comma-joined payload.
    pub fn payload(&self) -> String {
        self.fields.join(&SEPARATOR.to_string())
    }

    /// The full frame: header plus payload.
    pub fn to_frame(&self) -> Vec<u8> {
        encode_frame(self.payload().as_bytes())
    }
}

/// Prefix `payload` with its big-endian u32 length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Read the payload length from a frame header.
///
/// # Errors
/// `CodecError::Frame` if fewer than [`FRAME_HEADER_SIZE`] bytes are given.
pub fn parse_header(bytes: &[u8]) -> Result<usize> {
    let header: [u8; FRAME_HEADER_SIZE] = bytes
        .get(..FRAME_HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(CodecError::Frame {
            expected: FRAME_HEADER_SIZE,
            actual: bytes.len(),
        })?;
    Ok(u32::from_be_bytes(header) as usize)
}

/// Decode a complete frame into its payload string.
///
/// # Errors
/// - `CodecError::Frame` if the buffer is shorter than the header, or the
///   payload length doesn't match the header
/// - `CodecError::Decode` if the payload is not UTF-8
pub fn decode_frame(bytes: &[u8]) -> Result<String> {
    let expected = parse_header(bytes)?;
    let payload = &bytes[FRAME_HEADER_SIZE..];

    if payload.len() != expected {
        return Err(CodecError::Frame {
            expected,
            actual: payload.len(),
        }
        .into());
    }

    String::from_utf8(payload.to_vec())
        .map_err(|e| CodecError::Decode(e.to_string()).into())
}

/// Server reply to a framed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResponse {
    /// Status field (`"0"` for a stored bet)
    pub status: String,
    /// Result field (`"OK"` on success)
    pub result: String,
}

impl FrameResponse {
    /// Parse a reply payload. Trailing fields are ignored.
    ///
    /// # Errors
    /// `CodecError::MissingField` if the payload has fewer than two fields.
    pub fn parse(payload: &str) -> Result<Self> {
        let mut fields = payload.trim_end().split(SEPARATOR);
        let status = fields
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(CodecError::MissingField("status"))?;
        let result = fields.next().ok_or(CodecError::MissingField("result"))?;

        Ok(Self {
            status: status.to_string(),
            result: result.to_string(),
        })
    }

    /// Whether the server reported the record as stored.
    pub fn is_ok(&self) -> bool {
        self.result == "OK"
    }
}
