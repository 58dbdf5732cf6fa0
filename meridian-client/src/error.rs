//! Client error taxonomy.
//!
//! Four families, mirroring how failures propagate to callers:
//! - [`Error::Config`] - local environment or credential-file problems
//! - [`Error::Connection`] - transport failures, missing fingerprints,
//!   certificates outside their validity window
//! - [`Error::Trust`] - a trust policy refusal (new connection / new key),
//!   carrying the offending endpoint and fingerprint for display
//! - [`Error::Access`] / [`Error::Request`] - propagated from command
//!   execution, never generated by this layer

/// Which trust policy was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustErrorKind {
    /// No fingerprint is installed for the endpoint under any key form.
    NewConnection,
    /// Installed fingerprints exist but none match the live one.
    NewKey,
}

/// A trust refusal, with enough context for an operator to verify the
/// endpoint manually and re-run with override options.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TrustError {
    pub kind: TrustErrorKind,
    /// The configured `host:port` of the refused endpoint.
    pub host_port: String,
    /// The resolved `ip:port` of the refused endpoint.
    pub ip_port: String,
    /// The fingerprint the endpoint presented.
    pub fingerprint: String,
    /// Rendered warning + refusal text from the message catalog.
    pub message: String,
}

/// Errors surfaced by the credential and trust layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error("access error: {0}")]
    Access(String),

    #[error("request error: {0}")]
    Request(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach a second failure as suppressed context, keeping `self` as
    /// the primary error.
    #[must_use]
    pub fn with_suppressed(self, suppressed: &Error) -> Error {
        match self {
            Error::Config(msg) => Error::Config(format!("{msg} (suppressed: {suppressed})")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_error_displays_its_message() {
        let err = TrustError {
            kind: TrustErrorKind::NewKey,
            host_port: "srv:1666".to_string(),
            ip_port: "10.0.0.1:1666".to_string(),
            fingerprint: "AA:BB".to_string(),
            message: "fingerprint changed".to_string(),
        };
        assert_eq!(Error::from(err).to_string(), "fingerprint changed");
    }

    #[test]
    fn suppressed_failure_is_kept_in_the_message() {
        let first = Error::Config("save failed".to_string());
        let second = Error::Config("fallback save failed".to_string());
        let combined = first.with_suppressed(&second);
        let text = combined.to_string();
        assert!(text.contains("save failed"));
        assert!(text.contains("fallback save failed"));
    }
}
