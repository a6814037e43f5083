use sha2::{Digest, Sha256};

/// Result of comparing a reassembled file with its announced checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    ChecksumMismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Recomputes the digest of `data` and compares it with `expected`.
///
/// The comparison is on lowercase hex, so an uppercase announcement still
/// verifies.
pub fn verify_checksum(data: &[u8], expected: &str) -> Verification {
    let actual = checksum_bytes(data);
    if actual.eq_ignore_ascii_case(expected) {
        Verification::Verified
    } else {
        Verification::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        }
    }
}
