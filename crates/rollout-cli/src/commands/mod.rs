//! CLI command implementations

pub mod plan;
pub mod target;
