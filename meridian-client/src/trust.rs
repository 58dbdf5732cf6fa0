//! The trust API: fingerprint pinning and connection validation.
//!
//! Everything here operates on the two key forms of the endpoint - the
//! resolved `ip:port` and the configured `host:port` - independently.
//! Decisions about a single key form live in `meridian_auth::trust`;
//! this module adds persistence, live connections, and operator-facing
//! messages on top.

use meridian_auth::cert;
use meridian_auth::trust::{self, KeyFormStatus, Slot, TrustEntry, TrustOutcome};
use meridian_auth::Fingerprint;
use tracing::debug;

use crate::client::RpcClient;
use crate::config::{CertValidation, TrustNameMode};
use crate::connection::RpcConnection;
use crate::error::{Error, Result, TrustError, TrustErrorKind};
use crate::messages::MessageKey;

/// How the current connection's identity was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMethod {
    /// Full certificate chain validation succeeded.
    Chain,
    /// The certificate subject matched the configured host name.
    Hostname,
    /// The pinned fingerprint matched.
    Fingerprint,
}

/// Operator choices for one trust operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustOptions {
    /// Install without prompting.
    pub auto_accept: bool,
    /// Never install; report what would have been asked.
    pub auto_refuse: bool,
    /// Overwrite a mismatching installed fingerprint.
    pub force: bool,
    /// Operate on the replacement slot instead of the normal slot.
    pub replacement: bool,
}

impl RpcClient {
    /// Whether the last connection check validated the server by its
    /// certificate chain. Only meaningful for secure endpoints.
    pub fn is_validated_by_chain(&self) -> bool {
        self.endpoint.secure && self.validated_by == Some(ValidationMethod::Chain)
    }

    /// How the last connection check validated the server, if it did.
    pub fn validated_by(&self) -> Option<ValidationMethod> {
        self.validated_by
    }

    /// Read the live fingerprint from a fresh connection.
    pub fn get_trust(&self) -> Result<String> {
        self.with_connection(|conn| {
            conn.fingerprint()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| {
                    Error::Connection(
                        "no fingerprint presented by this connection".to_string(),
                    )
                })
        })
    }

    /// Establish (or refuse) trust in the current endpoint.
    ///
    /// Opens a short-lived connection to read the live fingerprint, then
    /// walks the decision table: promotion of a matching staged
    /// replacement first, then install / refuse depending on what is
    /// already on file and on `options`. Passing an explicit `value`
    /// implies both `auto_accept` and `force`. Returns the accumulated
    /// operator message on success; refusals surface as [`Error::Trust`].
    pub fn add_trust(&self, value: Option<&str>, options: &TrustOptions) -> Result<String> {
        let mut opts = *options;
        if value.is_some() {
            opts.auto_accept = true;
            opts.force = true;
        }

        self.with_connection(|conn| {
            let live = conn
                .fingerprint()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| {
                    Error::Connection(
                        "no fingerprint presented by this connection".to_string(),
                    )
                })?;

            let host_port = self.server_host_port();
            let ip_port = conn.server_ip_port();
            let ip_status = self.key_form_status(&ip_port, &live);
            let host_status = self.key_form_status(&host_port, &live);

            let new_connection_warning = self
                .catalog
                .message(MessageKey::TrustWarningNewConnection, &[&host_port, &live]);
            let new_key_warning = self
                .catalog
                .message(MessageKey::TrustWarningNewKey, &[&host_port, &live]);

            if opts.auto_refuse {
                if !ip_status.exists && !host_status.exists {
                    return Ok(new_connection_warning);
                }
                if !ip_status.matches && !host_status.matches {
                    return Ok(new_key_warning);
                }
            }

            // A matching staged replacement wins over everything else.
            let promoted_ip = self.promote_replacement(&ip_port, &ip_status, &live)?;
            let promoted_host = self.promote_replacement(&host_port, &host_status, &live)?;
            if promoted_ip || promoted_host {
                return Ok(self
                    .catalog
                    .message(MessageKey::TrustAlreadyEstablished, &[]));
            }

            let slot = if opts.replacement {
                Slot::Replacement
            } else {
                Slot::Normal
            };
            let install_value = value.unwrap_or(&live);
            let exists = ip_status.exists || host_status.exists;
            let matches = ip_status.matches || host_status.matches;

            if !exists {
                if opts.auto_accept {
                    let installed = self.install_fingerprint(conn, slot, install_value)?;
                    return Ok(new_connection_warning + &installed);
                }
                return Err(self.trust_refusal(
                    conn,
                    TrustErrorKind::NewConnection,
                    &live,
                    new_connection_warning,
                    MessageKey::TrustRefusedNewConnection,
                ));
            }

            if !matches {
                if opts.force && opts.auto_accept {
                    let installed = self.install_fingerprint(conn, slot, install_value)?;
                    return Ok(new_key_warning + &installed);
                }
                return Err(self.trust_refusal(
                    conn,
                    TrustErrorKind::NewKey,
                    &live,
                    new_key_warning,
                    MessageKey::TrustRefusedNewKey,
                ));
            }

            // Established already; an explicit value still overwrites.
            if value.is_some() {
                return self.install_fingerprint(conn, slot, install_value);
            }
            Ok(self
                .catalog
                .message(MessageKey::TrustAlreadyEstablished, &[]))
        })
    }

    /// Remove the installed fingerprint for the current endpoint.
    ///
    /// Operates on both key forms independently: each form that was not
    /// established contributes a warning, and each form that had a record
    /// in the selected slot contributes a removal confirmation.
    pub fn remove_trust(&self, options: &TrustOptions) -> Result<String> {
        let slot = if options.replacement {
            Slot::Replacement
        } else {
            Slot::Normal
        };

        self.with_connection(|conn| {
            let live = conn.fingerprint().unwrap_or_default();
            let host_port = self.server_host_port();
            let ip_port = conn.server_ip_port();

            let mut message = String::new();
            for key in [ip_port.as_str(), host_port.as_str()] {
                let status = self.key_form_status(key, &live);
                if !status.established() {
                    message += &self
                        .catalog
                        .message(MessageKey::TrustWarningNotEstablished, &[key, &live]);
                }
                if self.trust_store.lookup(key, slot.user_name()).is_some() {
                    self.trust_store.delete(key, slot.user_name()).map_err(|e| {
                        Error::Config(format!("cannot update trust file: {e}"))
                    })?;
                    message += &self
                        .catalog
                        .message(MessageKey::TrustRemoved, &[&host_port, key]);
                }
            }
            Ok(message)
        })
    }

    /// All persisted normal-slot trust entries.
    pub fn get_trusts(&self) -> Result<Vec<TrustEntry>> {
        Ok(self
            .load_fingerprints()
            .into_iter()
            .filter(|e| e.slot == Slot::Normal)
            .collect())
    }

    /// All persisted replacement-slot trust entries.
    pub fn get_replacement_trusts(&self) -> Result<Vec<TrustEntry>> {
        Ok(self
            .load_fingerprints()
            .into_iter()
            .filter(|e| e.slot == Slot::Replacement)
            .collect())
    }

    /// Validate a freshly opened connection before any command is sent.
    ///
    /// Chain and hostname validation are attempted per the configured
    /// mode; their failures are logged and fall through to the pinned
    /// fingerprint, which alone decides whether the connection proceeds.
    /// Insecure endpoints pass unconditionally.
    pub fn trust_connection_check(&mut self, conn: &mut dyn RpcConnection) -> Result<()> {
        self.validated_by = None;
        if !conn.is_secure() {
            return Ok(());
        }

        let host = self.endpoint.host.clone();
        match self.config.cert_validation {
            CertValidation::Chain => {
                let certs = conn.server_certs();
                if !conn.is_self_signed() && certs.len() >= 2 {
                    match cert::validate_server_chain(certs, &host) {
                        Ok(()) => {
                            self.validated_by = Some(ValidationMethod::Chain);
                            return Ok(());
                        }
                        Err(e) => {
                            debug!(error = %e, "chain validation failed; trying fingerprint");
                        }
                    }
                }
            }
            CertValidation::HostnameOnly => {
                if let Some(leaf) = conn.server_certs().first() {
                    match cert::verify_subject_matches_host(leaf, &host) {
                        Ok(()) => {
                            self.validated_by = Some(ValidationMethod::Hostname);
                            return Ok(());
                        }
                        Err(e) => {
                            debug!(error = %e, "hostname validation failed; trying fingerprint");
                        }
                    }
                }
            }
            CertValidation::Fingerprint => {}
        }

        self.check_fingerprint(conn)?;
        if conn.is_trusted() {
            self.validated_by = Some(ValidationMethod::Fingerprint);
        }
        Ok(())
    }

    /// Compare the connection's live fingerprint against the trust store
    /// and mark it trusted, promote a staged replacement, or refuse.
    pub fn check_fingerprint(&self, conn: &mut dyn RpcConnection) -> Result<()> {
        if !conn.is_secure() || conn.is_trusted() {
            return Ok(());
        }

        // An expired or not-yet-valid certificate is rejected before any
        // fingerprint comparison.
        if let Some(leaf) = conn.server_certs().first() {
            cert::verify_validity_dates(leaf).map_err(|e| Error::Connection(e.to_string()))?;
        }

        let live = conn
            .fingerprint()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                Error::Connection("no fingerprint presented by this connection".to_string())
            })?;

        let host_port = self.server_host_port();
        let ip_port = conn.server_ip_port();
        let ip_status = self.key_form_status(&ip_port, &live);
        let host_status = self.key_form_status(&host_port, &live);

        match trust::evaluate(&ip_status, &host_status) {
            TrustOutcome::NewConnection => {
                let warning = self
                    .catalog
                    .message(MessageKey::TrustWarningNotEstablished, &[&host_port, &live]);
                Err(self.trust_refusal(
                    conn,
                    TrustErrorKind::NewConnection,
                    &live,
                    warning,
                    MessageKey::TrustRefusedNewConnection,
                ))
            }
            TrustOutcome::NewKey => {
                let warning = self
                    .catalog
                    .message(MessageKey::TrustWarningNewKey, &[&host_port, &live]);
                Err(self.trust_refusal(
                    conn,
                    TrustErrorKind::NewKey,
                    &live,
                    warning,
                    MessageKey::TrustRefusedNewKey,
                ))
            }
            TrustOutcome::Replaced | TrustOutcome::AlreadyTrusted => {
                self.promote_replacement(&ip_port, &ip_status, &live)?;
                self.promote_replacement(&host_port, &host_status, &live)?;
                conn.set_trusted(true);
                Ok(())
            }
        }
    }

    /// Lookup facts for one key form against the live fingerprint.
    fn key_form_status(&self, server_key: &str, live: &str) -> KeyFormStatus {
        let normal = self.trust_store.lookup(server_key, Slot::Normal.user_name());
        let replacement = self
            .trust_store
            .lookup(server_key, Slot::Replacement.user_name());
        KeyFormStatus {
            exists: normal.is_some(),
            matches: normal
                .map(|v| Fingerprint::new(v).matches(live))
                .unwrap_or(false),
            replacement_exists: replacement.is_some(),
            replacement_matches: replacement
                .map(|v| Fingerprint::new(v).matches(live))
                .unwrap_or(false),
        }
    }

    /// Promote a matching staged replacement to the normal slot for one
    /// key form. Returns whether a promotion happened.
    fn promote_replacement(
        &self,
        server_key: &str,
        status: &KeyFormStatus,
        live: &str,
    ) -> Result<bool> {
        if !status.promotion_eligible() {
            return Ok(false);
        }
        self.save_fingerprint(server_key, Slot::Normal, live)?;
        self.trust_store
            .delete(server_key, Slot::Replacement.user_name())
            .map_err(|e| Error::Config(format!("cannot update trust file: {e}")))?;
        debug!(server_key, "promoted replacement fingerprint");
        Ok(true)
    }

    /// Write `value` under the key form(s) selected by configuration,
    /// returning a confirmation per key written.
    fn install_fingerprint(
        &self,
        conn: &dyn RpcConnection,
        slot: Slot,
        value: &str,
    ) -> Result<String> {
        let host_port = self.server_host_port();
        let ip_port = conn.server_ip_port();
        let host_key = conn
            .server_host_name_port()
            .unwrap_or_else(|| host_port.clone());

        let keys: Vec<&str> = match self.config.trust_name_mode {
            TrustNameMode::IpOnly => vec![&ip_port],
            TrustNameMode::HostOnly => vec![&host_key],
            TrustNameMode::IpAndHost => vec![&ip_port, &host_key],
        };

        let mut message = String::new();
        for key in keys {
            self.save_fingerprint(key, slot, value)?;
            message += &self
                .catalog
                .message(MessageKey::TrustAdded, &[&host_port, key]);
        }
        Ok(message)
    }

    /// Persist one fingerprint record. Blank keys are ignored.
    pub fn save_fingerprint(&self, server_key: &str, slot: Slot, value: &str) -> Result<()> {
        if server_key.trim().is_empty() {
            return Ok(());
        }
        self.trust_store
            .save(server_key, slot.user_name(), value)
            .map_err(|e| Error::Config(format!("cannot update trust file: {e}")))
    }

    /// Read one fingerprint record back.
    pub fn load_fingerprint(&self, server_key: &str, slot: Slot) -> Option<Fingerprint> {
        self.trust_store
            .lookup(server_key, slot.user_name())
            .map(Fingerprint::new)
    }

    /// Every record in the trust file, both slots.
    pub fn load_fingerprints(&self) -> Vec<TrustEntry> {
        self.trust_store
            .load_all()
            .into_iter()
            .map(|r| TrustEntry {
                server_key: r.server,
                slot: Slot::from_user_name(&r.user),
                value: Fingerprint::new(r.value),
            })
            .collect()
    }

    fn trust_refusal(
        &self,
        conn: &dyn RpcConnection,
        kind: TrustErrorKind,
        fingerprint: &str,
        warning: String,
        refusal: MessageKey,
    ) -> Error {
        let message = warning + &self.catalog.message(refusal, &[]);
        Error::Trust(TrustError {
            kind,
            host_port: self.server_host_port(),
            ip_port: conn.server_ip_port(),
            fingerprint: fingerprint.to_string(),
            message,
        })
    }
}
