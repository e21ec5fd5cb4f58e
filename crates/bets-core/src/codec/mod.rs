//! Wire codecs.
//!
//! Two protocol families are supported:
//! - [`json`]: newline-delimited JSON. Batches are arrays of records, control
//!   requests are tagged objects. This is what [`crate::engine::ClientSession`]
//!   speaks.
//! - [`frame`]: a 4-byte big-endian length prefix followed by comma-joined
//!   fields, one record per connection.

pub mod frame;
pub mod json;

pub use frame::{decode_frame, encode_frame, FrameResponse, FramedRecord, FRAME_HEADER_SIZE};
pub use json::{
    decode_ack, decode_query_response, encode_batch, encode_control, Acknowledgement,
    ControlRequest, QueryOutcome,
};
