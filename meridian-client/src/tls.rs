//! rustls-backed transport.
//!
//! The TLS handshake here accepts any server certificate: identity is
//! decided by the trust layer after the handshake, from the captured
//! chain and its fingerprint. The verifier still checks handshake
//! signatures so a peer must actually hold the key for the certificate
//! it presents.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use meridian_auth::{cert, Fingerprint};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use tracing::debug;

use crate::connection::{Endpoint, RpcConnection, Transport};
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Accepts every server certificate at handshake time.
///
/// Chain, hostname, and fingerprint checks run after the handshake in
/// the trust layer, which needs the captured chain either way.
#[derive(Debug)]
struct CapturingVerifier;

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TCP/TLS connection factory.
#[derive(Debug, Default)]
pub struct TlsTransport;

impl TlsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TlsTransport {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn RpcConnection>> {
        let stream = connect_tcp(endpoint)?;
        let ip_port = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .map_err(|e| Error::Connection(format!("cannot resolve peer address: {e}")))?;
        let host_name_port = if endpoint.host.parse::<std::net::IpAddr>().is_ok() {
            None
        } else {
            Some(endpoint.host_port())
        };

        if !endpoint.secure {
            return Ok(Box::new(PlainConnection {
                stream: Some(stream),
                ip_port,
                host_name_port,
            }));
        }

        let config = tls_client_config();
        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|e| Error::Connection(format!("invalid server name: {e}")))?;
        let conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| Error::Connection(format!("cannot start TLS session: {e}")))?;
        let mut tls = StreamOwned::new(conn, stream);

        while tls.conn.is_handshaking() {
            tls.conn
                .complete_io(&mut tls.sock)
                .map_err(|e| Error::Connection(format!("TLS handshake failed: {e}")))?;
        }

        let certs: Vec<Vec<u8>> = tls
            .conn
            .peer_certificates()
            .map(|chain| chain.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default();
        let fingerprint = certs
            .first()
            .map(|leaf| Fingerprint::of_cert_der(leaf).to_string());
        let self_signed = match certs.as_slice() {
            [] => false,
            [leaf, ..] => certs.len() == 1 || cert::is_self_issued(leaf).unwrap_or(false),
        };
        debug!(
            peer = %ip_port,
            chain_len = certs.len(),
            self_signed,
            "TLS handshake complete"
        );

        Ok(Box::new(TlsConnection {
            tls: Some(tls),
            ip_port,
            host_name_port,
            certs,
            fingerprint,
            self_signed,
            trusted: false,
        }))
    }
}

fn connect_tcp(endpoint: &Endpoint) -> Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection(format!("cannot resolve {}: {e}", endpoint.host_port())))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(Error::Connection(match last_error {
        Some(e) => format!("cannot connect to {}: {e}", endpoint.host_port()),
        None => format!("no addresses resolved for {}", endpoint.host_port()),
    }))
}

fn tls_client_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(CapturingVerifier))
        .with_no_client_auth()
}

/// An insecure TCP connection. Presents no certificates and no
/// fingerprint; the trust layer passes it through untouched.
struct PlainConnection {
    stream: Option<TcpStream>,
    ip_port: String,
    host_name_port: Option<String>,
}

impl RpcConnection for PlainConnection {
    fn fingerprint(&self) -> Option<String> {
        None
    }

    fn server_ip_port(&self) -> String {
        self.ip_port.clone()
    }

    fn server_host_name_port(&self) -> Option<String> {
        self.host_name_port.clone()
    }

    fn server_certs(&self) -> &[Vec<u8>] {
        &[]
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn is_self_signed(&self) -> bool {
        false
    }

    fn is_trusted(&self) -> bool {
        false
    }

    fn set_trusted(&mut self, _trusted: bool) {}

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// A TLS connection with its captured certificate chain.
struct TlsConnection {
    tls: Option<StreamOwned<ClientConnection, TcpStream>>,
    ip_port: String,
    host_name_port: Option<String>,
    certs: Vec<Vec<u8>>,
    fingerprint: Option<String>,
    self_signed: bool,
    trusted: bool,
}

impl RpcConnection for TlsConnection {
    fn fingerprint(&self) -> Option<String> {
        self.fingerprint.clone()
    }

    fn server_ip_port(&self) -> String {
        self.ip_port.clone()
    }

    fn server_host_name_port(&self) -> Option<String> {
        self.host_name_port.clone()
    }

    fn server_certs(&self) -> &[Vec<u8>] {
        &self.certs
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }

    fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    fn disconnect(&mut self) {
        if let Some(mut tls) = self.tls.take() {
            tls.conn.send_close_notify();
            let _ = tls.conn.complete_io(&mut tls.sock);
            let _ = tls.sock.shutdown(std::net::Shutdown::Both);
        }
    }
}
