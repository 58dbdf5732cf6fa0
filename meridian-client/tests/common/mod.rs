//! Shared harness: a scripted transport and client construction against
//! temp-dir credential files.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use meridian_client::{
    ClientConfig, DefaultCatalog, Endpoint, LockParams, RpcClient, RpcConnection, Transport,
};
use tempfile::TempDir;

pub const HOST: &str = "srv.example";
pub const PORT: u16 = 1666;
pub const IP_PORT: &str = "10.0.0.1:1666";
pub const FINGERPRINT: &str = "AB:CD:EF:01:23:45";

/// A connection whose answers are fixed up front.
#[derive(Clone)]
pub struct MockConnection {
    pub fingerprint: Option<String>,
    pub ip_port: String,
    pub host_name_port: Option<String>,
    pub certs: Vec<Vec<u8>>,
    pub secure: bool,
    pub self_signed: bool,
    pub trusted: bool,
    pub disconnected: bool,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self {
            fingerprint: Some(FINGERPRINT.to_string()),
            ip_port: IP_PORT.to_string(),
            host_name_port: Some(format!("{HOST}:{PORT}")),
            certs: Vec::new(),
            secure: true,
            self_signed: true,
            trusted: false,
            disconnected: false,
        }
    }
}

impl RpcConnection for MockConnection {
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
        self.secure
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
        self.disconnected = true;
    }
}

/// Hands out clones of a template connection.
pub struct MockTransport {
    pub template: MockConnection,
}

impl MockTransport {
    pub fn new(template: MockConnection) -> Arc<Self> {
        Arc::new(Self { template })
    }
}

impl Transport for MockTransport {
    fn open(&self, _endpoint: &Endpoint) -> meridian_client::Result<Box<dyn RpcConnection>> {
        Ok(Box::new(self.template.clone()))
    }
}

/// A client over temp-dir credential files and the given transport.
pub fn client(tmp: &TempDir, transport: Arc<dyn Transport>) -> RpcClient {
    client_with(tmp, transport, |_| {})
}

/// Same as [`client`] but lets the test adjust the configuration.
pub fn client_with(
    tmp: &TempDir,
    transport: Arc<dyn Transport>,
    tweak: impl FnOnce(&mut ClientConfig),
) -> RpcClient {
    let mut config = ClientConfig {
        tickets_path: Some(tmp.path().join("tickets")),
        trust_path: Some(tmp.path().join("trust")),
        lock: LockParams {
            tries: 3,
            delay_ms: 5,
            wait_ms: 50,
        },
        ..ClientConfig::default()
    };
    tweak(&mut config);
    RpcClient::new(
        config,
        Endpoint::new(HOST, PORT, true),
        transport,
        Arc::new(DefaultCatalog),
    )
    .expect("client construction")
}

/// A client whose connections all present the default fingerprint.
pub fn default_client(tmp: &TempDir) -> RpcClient {
    client(tmp, MockTransport::new(MockConnection::default()))
}

/// Raw trust-file contents, empty string if the file does not exist.
pub fn trust_file(tmp: &TempDir) -> String {
    std::fs::read_to_string(tmp.path().join("trust")).unwrap_or_default()
}
