//! User-facing message catalog.
//!
//! All warning/info text shown to operators goes through a catalog so an
//! integrating application can localize it. Keys are opaque identifiers;
//! parameters are positional. [`DefaultCatalog`] supplies the built-in
//! English text.

/// Identifiers for every message this layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MessageKey {
    /// Params: host:port, fingerprint.
    TrustWarningNewConnection,
    /// Params: host:port, fingerprint.
    TrustWarningNewKey,
    /// Params: host:port, fingerprint.
    TrustWarningNotEstablished,
    /// Params: host:port, server key actually written.
    TrustAdded,
    /// Params: host:port, server key actually removed.
    TrustRemoved,
    TrustAlreadyEstablished,
    TrustRefusedNewConnection,
    TrustRefusedNewKey,
}

/// Message lookup collaborator.
pub trait MessageCatalog: Send + Sync {
    /// Resolve `key` with positional `params` substituted.
    fn message(&self, key: MessageKey, params: &[&str]) -> String;
}

/// Built-in English messages.
#[derive(Debug, Default, Clone)]
pub struct DefaultCatalog;

impl MessageCatalog for DefaultCatalog {
    fn message(&self, key: MessageKey, params: &[&str]) -> String {
        let p = |i: usize| params.get(i).copied().unwrap_or("");
        match key {
            MessageKey::TrustWarningNewConnection => format!(
                "The authenticity of '{}' can't be established; this may be your \
                 first attempt to connect to this server. The fingerprint of the \
                 public key sent to your client is: {}\n",
                p(0),
                p(1)
            ),
            MessageKey::TrustWarningNewKey => format!(
                "******* WARNING *******\nThe fingerprint of the server at '{}' \
                 CHANGED and does not match the fingerprint on file. The mismatch \
                 may indicate an attack; verify before proceeding. The fingerprint \
                 sent to your client is: {}\n",
                p(0),
                p(1)
            ),
            MessageKey::TrustWarningNotEstablished => {
                format!("Trust has not been established for '{}' ({})\n", p(0), p(1))
            }
            MessageKey::TrustAdded => {
                format!("Added trust for server '{}' ({})\n", p(0), p(1))
            }
            MessageKey::TrustRemoved => {
                format!("Removed trust for server '{}' ({})\n", p(0), p(1))
            }
            MessageKey::TrustAlreadyEstablished => {
                "Trust already established.\n".to_string()
            }
            MessageKey::TrustRefusedNewConnection => {
                "To allow connection use the 'trust add' command.\n".to_string()
            }
            MessageKey::TrustRefusedNewKey => {
                "To override the existing fingerprint use the 'trust add' command \
                 with the force option.\n"
                    .to_string()
            }
        }
    }
}
