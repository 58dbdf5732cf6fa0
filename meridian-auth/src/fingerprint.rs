//! Certificate fingerprints.
//!
//! A fingerprint is the SHA-256 digest of a server certificate in DER
//! form, rendered as colon-separated uppercase hex pairs (the wire
//! spelling used by the protocol). Comparison against a presented
//! fingerprint is constant-time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A server certificate fingerprint.
///
/// Stored and transmitted as a string; the canonical form produced by
/// [`Fingerprint::of_cert_der`] is `AB:CD:...` over the SHA-256 digest,
/// but any non-empty string read back from a trust store is accepted
/// as-is and compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing fingerprint string (e.g. one read from a trust
    /// store or received from the transport).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Compute the canonical fingerprint of a DER-encoded certificate.
    #[must_use]
    pub fn of_cert_der(cert_der: &[u8]) -> Self {
        let digest = Sha256::digest(cert_der);
        let mut out = String::with_capacity(digest.len() * 3);
        for (i, byte) in digest.iter().enumerate() {
            if i > 0 {
                out.push(':');
            }
            out.push_str(&format!("{byte:02X}"));
        }
        Self(out)
    }

    /// The fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the fingerprint is empty (no fingerprint available).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against another fingerprint string.
    ///
    /// Length is not secret (fingerprints are fixed-width digests), so a
    /// length mismatch may return early.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        if self.0.len() != other.len() {
            return false;
        }
        self.0.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
