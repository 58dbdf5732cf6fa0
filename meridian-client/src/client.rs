//! The client session object.
//!
//! [`RpcClient`] owns everything the credential layer needs per server:
//! the resolved endpoint, the in-memory ticket and secret-key caches,
//! and the two file-backed credential stores. The in-memory maps are
//! plain fields on this object - callers issuing concurrent requests on
//! the same client must synchronize externally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use zeroize::Zeroizing;

use crate::config::ClientConfig;
use crate::connection::{Endpoint, RpcConnection, Transport};
use crate::error::{Error, Result};
use crate::messages::MessageCatalog;
use crate::session::SessionNegotiator;
use crate::store::RecordStore;
use crate::trust::ValidationMethod;

/// Server-reported text telling a client no login is needed.
const PASSWORD_NOT_SET: &str = "no password set for this user";

/// Description of the connected server, as reported by it.
#[derive(Debug, Clone)]
pub struct ServerDescription {
    /// Cluster identifier, when the server belongs to one.
    pub cluster: Option<String>,
    /// Whether user names on this server are case-sensitive.
    pub case_sensitive: bool,
}

impl Default for ServerDescription {
    fn default() -> Self {
        Self {
            cluster: None,
            case_sensitive: true,
        }
    }
}

/// One client session against one server endpoint.
pub struct RpcClient {
    pub(crate) config: ClientConfig,
    pub(crate) endpoint: Endpoint,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) catalog: Arc<dyn MessageCatalog>,
    negotiator: SessionNegotiator,

    server_id: Option<String>,
    server_description: ServerDescription,
    user_name: Option<String>,
    client_name: Option<String>,
    local_host_name: Option<String>,

    auth_tickets: HashMap<String, String>,
    secret_keys: HashMap<String, Zeroizing<String>>,
    pbufs: HashMap<String, String>,

    pub(crate) ticket_store: RecordStore,
    pub(crate) trust_store: RecordStore,
    pub(crate) validated_by: Option<ValidationMethod>,

    connection_start: Option<Instant>,
}

impl RpcClient {
    /// Build a client for `endpoint`, resolving both credential-file
    /// paths up front.
    pub fn new(
        config: ClientConfig,
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        catalog: Arc<dyn MessageCatalog>,
    ) -> Result<Self> {
        let ticket_store = RecordStore::new(config.tickets_file()?, config.lock);
        let trust_store = RecordStore::new(config.trust_file()?, config.lock);
        let negotiator = SessionNegotiator::new(&config);
        let local_host_name = config
            .host_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.trim().is_empty());

        Ok(Self {
            config,
            endpoint,
            transport,
            catalog,
            negotiator,
            server_id: None,
            server_description: ServerDescription::default(),
            user_name: None,
            client_name: None,
            local_host_name,
            auth_tickets: HashMap::new(),
            secret_keys: HashMap::new(),
            pbufs: HashMap::new(),
            ticket_store,
            trust_store,
            validated_by: None,
            connection_start: None,
        })
    }

    // --- identity and addressing -------------------------------------

    pub fn negotiator(&self) -> &SessionNegotiator {
        &self.negotiator
    }

    pub fn negotiator_mut(&mut self) -> &mut SessionNegotiator {
        &mut self.negotiator
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn set_user_name(&mut self, user_name: impl Into<String>) {
        self.user_name = Some(user_name.into());
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn set_client_name(&mut self, client_name: impl Into<String>) {
        self.client_name = Some(client_name.into());
    }

    pub fn local_host_name(&self) -> Option<&str> {
        self.local_host_name.as_deref()
    }

    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    /// Set the server id reported by the server. Used as the server
    /// portion of ticket-file entries.
    pub fn set_server_id(&mut self, server_id: impl Into<String>) {
        self.server_id = Some(server_id.into());
    }

    pub fn server_description(&self) -> &ServerDescription {
        &self.server_description
    }

    pub fn set_server_description(&mut self, description: ServerDescription) {
        self.server_description = description;
    }

    /// The configured `host:port` key form. Falls back to the bare port
    /// when no host is configured.
    pub fn server_host_port(&self) -> String {
        if self.endpoint.host.trim().is_empty() {
            self.endpoint.port.to_string()
        } else {
            self.endpoint.host_port()
        }
    }

    /// The server address used for ticket entries.
    pub fn server_address(&self) -> String {
        self.server_host_port()
    }

    pub fn is_cluster_member(&self) -> bool {
        self.server_description.cluster.is_some()
    }

    /// The server's authentication id: the cluster id when clustered,
    /// otherwise `host:port`.
    pub fn auth_id(&self) -> String {
        match &self.server_description.cluster {
            Some(cluster) => cluster.clone(),
            None => self.server_host_port(),
        }
    }

    /// Compose the key for a ticket entry. A server part with no colon
    /// is assumed to be a bare port on the local host.
    pub(crate) fn compose_ticket_key(&self, user_name: &str, server_address: &str) -> String {
        let well_formed = if server_address.contains(':') {
            server_address.to_string()
        } else {
            format!("localhost:{server_address}")
        };
        format!("{well_formed}={user_name}")
    }

    /// Downcase the user name when the server is case-insensitive.
    pub(crate) fn lowercaseable_user_name(&self, user_name: &str) -> String {
        if self.server_description.case_sensitive {
            user_name.to_string()
        } else {
            user_name.to_lowercase()
        }
    }

    fn resolve_server_address(&self, server_id: Option<&str>) -> Option<String> {
        if let Some(explicit) = non_blank(server_id) {
            return Some(explicit.to_string());
        }
        let mut address = self
            .server_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.server_address());
        if let Some(cluster) = &self.server_description.cluster {
            address = cluster.clone();
        }
        non_blank(Some(&address)).map(str::to_string)
    }

    // --- in-memory ticket cache --------------------------------------

    /// Fetch the cached ticket for `(user, server)`. Never fails: a
    /// blank user or an empty cache yields `None`.
    pub fn get_auth_ticket(&self, user_name: &str, server_id: Option<&str>) -> Option<String> {
        if user_name.trim().is_empty() || self.auth_tickets.is_empty() {
            return None;
        }
        let user = self.lowercaseable_user_name(user_name);
        let address = match non_blank(server_id) {
            Some(explicit) => explicit.to_string(),
            None => {
                let mut address = self
                    .server_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| self.server_address());
                // Fall back to the live host:port when the direct key misses.
                if !self
                    .auth_tickets
                    .contains_key(&self.compose_ticket_key(&user, &address))
                {
                    address = self.server_address();
                }
                if let Some(cluster) = &self.server_description.cluster {
                    address = cluster.clone();
                }
                address
            }
        };
        if address.trim().is_empty() {
            return None;
        }
        self.auth_tickets
            .get(&self.compose_ticket_key(&user, &address))
            .cloned()
    }

    /// Cache a ticket for `(user, server)`. A blank ticket deletes the
    /// entry. Fails when no server address can be resolved.
    pub fn set_auth_ticket(
        &mut self,
        user_name: &str,
        server_id: Option<&str>,
        ticket: Option<&str>,
    ) -> Result<()> {
        if user_name.trim().is_empty() {
            return Err(Error::Config(
                "blank user name passed to set_auth_ticket".to_string(),
            ));
        }
        let user = self.lowercaseable_user_name(user_name);
        let address = self.resolve_server_address(server_id).ok_or_else(|| {
            Error::Config("no server address resolvable in set_auth_ticket".to_string())
        })?;
        let key = self.compose_ticket_key(&user, &address);
        match non_blank(ticket) {
            Some(value) => {
                self.auth_tickets.insert(key, value.to_string());
            }
            None => {
                self.auth_tickets.remove(&key);
            }
        }
        Ok(())
    }

    // --- persisted tickets -------------------------------------------

    /// Read a ticket back from the tickets file, falling back to the
    /// live `host:port` key. Errors degrade to `None`.
    pub fn load_ticket(&self, server_id: Option<&str>, user_name: &str) -> Option<String> {
        if user_name.trim().is_empty() {
            return None;
        }
        let user = self.lowercaseable_user_name(user_name);
        if let Some(id) = non_blank(server_id) {
            if let Some(value) = self.ticket_store.lookup(id, &user) {
                return Some(value);
            }
        }
        self.ticket_store.lookup(&self.server_host_port(), &user)
    }

    /// Persist a ticket to the tickets file.
    ///
    /// Saves under the resolved server id first; when the ticket is
    /// blank or no id is resolved, also saves under the live
    /// `host:port` so stale entries under either key are cleared. Both
    /// attempts always run; the first failure is raised after both, with
    /// any second failure attached as suppressed context.
    pub fn save_ticket(
        &self,
        user_name: &str,
        server_id: Option<&str>,
        ticket: Option<&str>,
    ) -> Result<()> {
        let user = self.lowercaseable_user_name(user_name);
        let resolved_id = non_blank(server_id)
            .map(str::to_string)
            .or_else(|| self.server_id.clone().filter(|id| !id.trim().is_empty()));

        let ticket_value = ticket.unwrap_or("");
        let mut failure = self.quiet_save_ticket(resolved_id.as_deref(), &user, ticket_value, None);

        if ticket_value.trim().is_empty() || resolved_id.is_none() {
            let host_port = self.server_host_port();
            failure = self.quiet_save_ticket(Some(&host_port), &user, ticket_value, failure);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn quiet_save_ticket(
        &self,
        server_address: Option<&str>,
        user_name: &str,
        ticket: &str,
        prior: Option<Error>,
    ) -> Option<Error> {
        let Some(address) = non_blank(server_address) else {
            return prior;
        };
        match self.ticket_store.save(address, user_name, ticket) {
            Ok(()) => prior,
            Err(e) => {
                let error = Error::Config(format!("cannot save ticket for {address}: {e}"));
                Some(match prior {
                    Some(first) => first.with_suppressed(&error),
                    None => error,
                })
            }
        }
    }

    // --- secret keys / protocol buffers ------------------------------

    /// Per-user secret key. Process-local, never persisted, survives
    /// reconnects.
    pub fn secret_key(&self, user_name: &str) -> Option<&str> {
        if user_name.trim().is_empty() {
            return None;
        }
        self.secret_keys.get(user_name).map(|v| v.as_str())
    }

    /// Set or clear (blank value) the per-user secret key.
    pub fn set_secret_key(&mut self, user_name: &str, secret_key: &str) {
        if user_name.trim().is_empty() {
            return;
        }
        if secret_key.trim().is_empty() {
            self.secret_keys.remove(user_name);
        } else {
            self.secret_keys
                .insert(user_name.to_string(), Zeroizing::new(secret_key.to_string()));
        }
    }

    /// Per-user protocol session buffer, same lifecycle as secret keys.
    pub fn pbuf(&self, user_name: &str) -> Option<&str> {
        if user_name.trim().is_empty() {
            return None;
        }
        self.pbufs.get(user_name).map(String::as_str)
    }

    /// Set or clear (blank value) the per-user protocol buffer.
    pub fn set_pbuf(&mut self, user_name: &str, pbuf: &str) {
        if user_name.trim().is_empty() {
            return;
        }
        if pbuf.trim().is_empty() {
            self.pbufs.remove(user_name);
        } else {
            self.pbufs.insert(user_name.to_string(), pbuf.to_string());
        }
    }

    // --- connection lifecycle ----------------------------------------

    /// Open a connection to the endpoint and validate its identity
    /// before anything else is sent. The connection is closed on every
    /// failure path.
    pub fn connect(&mut self) -> Result<Box<dyn RpcConnection>> {
        let mut conn = self.transport.open(&self.endpoint)?;
        self.connection_start = Some(Instant::now());
        if let Err(e) = self.trust_connection_check(conn.as_mut()) {
            conn.disconnect();
            return Err(e);
        }
        Ok(conn)
    }

    /// Tear down a connection and log the session duration.
    pub fn disconnect(&mut self, conn: &mut dyn RpcConnection) {
        conn.disconnect();
        if let Some(start) = self.connection_start.take() {
            info!(
                server = %self.server_host_port(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "connection closed"
            );
        }
    }

    /// Whether a server message means login is unnecessary.
    pub fn is_login_not_required(&self, message: &str) -> bool {
        message.contains(PASSWORD_NOT_SET)
    }

    /// Run `f` against a short-lived connection, closing it on every
    /// exit path including errors.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn RpcConnection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.transport.open(&self.endpoint)?;
        let result = f(conn.as_mut());
        conn.disconnect();
        result
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
