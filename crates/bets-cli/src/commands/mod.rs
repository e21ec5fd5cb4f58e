//! CLI command implementations.

pub mod query;
pub mod run;
pub mod send_one;
