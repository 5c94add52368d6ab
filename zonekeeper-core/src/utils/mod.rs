//! 工具函数

pub mod domain;
mod keyed_lock;

pub use domain::{
    is_within_zone, normalize_certificate_domain, normalize_record_name, normalize_zone_name,
};
pub use keyed_lock::{KeyedGuard, KeyedLocks};

/// Milliseconds elapsed since `start`, saturating.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
