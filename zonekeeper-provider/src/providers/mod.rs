//! Vendor drivers

/// Shared helpers used by the vendor drivers.
pub mod common;

#[cfg(feature = "aliyun")]
mod aliyun;
#[cfg(feature = "cloudflare")]
mod cloudflare;
#[cfg(feature = "dnspod")]
mod dnspod;

#[cfg(feature = "aliyun")]
pub use aliyun::{AliyunProvider, AliyunProviderBuilder};
#[cfg(feature = "cloudflare")]
pub use cloudflare::CloudflareProvider;
#[cfg(feature = "dnspod")]
pub use dnspod::{DnspodProvider, DnspodProviderBuilder};
