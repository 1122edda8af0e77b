//! Trade signal text parsing.

mod parser;

pub use parser::parse_signal;
