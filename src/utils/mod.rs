//! Utility functions

pub mod common;

pub use common::{format_datetime, now, parse_datetime, truncate_to_seconds};
