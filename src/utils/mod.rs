//! Shared utilities: duration parsing and placement validation.

pub mod duration;
pub mod validation;

pub use duration::parse_duration;
pub use validation::{validate_host_placement, validate_subnet_nesting};
