//! Transport collaborator contract.
//!
//! The raw socket/TLS plumbing lives outside this layer; trust checks
//! and the trust API consume connections through these traits. A real
//! implementation backed by rustls is in [`crate::tls`]; tests use
//! scripted mocks.

use crate::error::Result;

/// One live connection to a server endpoint.
///
/// Certificate bytes are DER, leaf first. A connection starts untrusted;
/// the trust layer flips the flag after validation succeeds.
pub trait RpcConnection {
    /// The fingerprint of the presented certificate, if any.
    fn fingerprint(&self) -> Option<String>;

    /// The resolved `ip:port` the socket is connected to.
    fn server_ip_port(&self) -> String;

    /// The configured `host:port`, when a host name was used to dial.
    fn server_host_name_port(&self) -> Option<String>;

    /// The presented certificate chain, leaf first, DER-encoded.
    fn server_certs(&self) -> &[Vec<u8>];

    fn is_secure(&self) -> bool;

    /// Whether the leaf certificate is self-signed.
    fn is_self_signed(&self) -> bool;

    fn is_trusted(&self) -> bool;

    fn set_trusted(&mut self, trusted: bool);

    /// Tear the connection down. Must be safe to call on every exit
    /// path, including after errors.
    fn disconnect(&mut self);
}

/// Endpoint coordinates for opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// The `host:port` key form for this endpoint.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection factory. The trust API opens short-lived connections
/// through this to read live fingerprints.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn RpcConnection>>;
}
