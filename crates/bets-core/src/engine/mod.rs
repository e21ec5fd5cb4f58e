//! Client session engine.
//!
//! [`ClientSession`] runs the batch protocol over newline-delimited JSON.
//! [`send_single_record`] submits one record over the length-prefixed
//! framing on its own connection.

mod session;
mod single;
mod state;

pub use session::{ClientSession, SessionReport};
pub use single::{send_single_record, submit_framed_record};
pub use state::SessionState;
