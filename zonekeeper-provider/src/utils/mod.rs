//! Utility modules.

/// Keeps large response bodies out of the logs.
pub mod log_sanitizer;
