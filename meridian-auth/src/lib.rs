//! Pure trust primitives for the meridian client.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! It provides the value types and decision logic that the client layer
//! composes with its file-backed stores and transport:
//! - [`Fingerprint`] - certificate digest with constant-time comparison
//! - [`Slot`] / [`TrustEntry`] - the trust-store record model
//! - [`trust::evaluate`] - the two-key-form trust decision
//! - [`cert`] - X.509 validity, hostname, and chain checks

pub mod cert;
pub mod fingerprint;
pub mod trust;

pub use cert::CertError;
pub use fingerprint::Fingerprint;
pub use trust::{KeyFormStatus, Slot, TrustEntry, TrustOutcome, evaluate};
