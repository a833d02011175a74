//! CLI command implementations. Each returns the text to print.

pub mod check;
pub mod edit;
pub mod inspect;
