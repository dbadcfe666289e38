//! Cross-cutting foundations: errors, configuration, path helpers.

pub mod config;
pub mod errors;
pub mod paths;
