//! Action Resolver: raw provider text → canonical [`Action`](crate::Action)
//!
//! - `parse`: normalisation and the output contract
//! - `retry`: bounded retry state machine with a deterministic fallback

mod parse;
mod retry;

pub use parse::{parse_action, OutputFormat, ParseError};
pub use retry::{ActionResolver, Resolution};
