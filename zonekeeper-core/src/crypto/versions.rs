//! Blob format versions
//!
//! The version tag is the first field of a sealed blob (`v2:...`). Each version
//! implies its KDF parameters; nothing else about them is stored.
//! - v1: PBKDF2-HMAC-SHA256, 100,000 iterations
//! - v2: PBKDF2-HMAC-SHA256, 600,000 iterations (OWASP 2023 Recommended)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobVersion {
    V1,
    V2,
}

impl BlobVersion {
    /// Version used for every new blob.
    pub const CURRENT: Self = Self::V2;

    pub const fn iterations(self) -> u32 {
        match self {
            Self::V1 => 100_000,
            Self::V2 => 600_000,
        }
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "v1" => Some(Self::V1),
            "v2" => Some(Self::V2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterations_per_version() {
        assert_eq!(BlobVersion::V1.iterations(), 100_000);
        assert_eq!(BlobVersion::V2.iterations(), 600_000);
        assert_eq!(BlobVersion::CURRENT, BlobVersion::V2);
    }

    #[test]
    fn tags() {
        assert_eq!(BlobVersion::from_tag("v1"), Some(BlobVersion::V1));
        assert_eq!(BlobVersion::from_tag(BlobVersion::V2.tag()), Some(BlobVersion::V2));
        assert_eq!(BlobVersion::from_tag("v9"), None);
    }
}
