//! Client configuration.
//!
//! Loadable from a TOML file; every field has a sensible default so a
//! bare `ClientConfig::default()` works against a typical deployment.
//! Credential-file paths resolve in three steps: explicit config field,
//! environment variable, then the OS default under the user's home
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the tickets file.
pub const TICKETS_ENV_VAR: &str = "MERIDIAN_TICKETS";

/// Environment variable naming the trust file.
pub const TRUST_ENV_VAR: &str = "MERIDIAN_TRUST";

/// How a secure connection's certificate is validated before any RPC
/// command is sent.
///
/// The priority order (chain, then hostname, then fingerprint fallback)
/// is fixed; this selects which methods are attempted at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertValidation {
    /// Fingerprint comparison only (the default; self-signed deployments).
    #[default]
    Fingerprint,
    /// Try full chain validation, fall back to fingerprint.
    Chain,
    /// Verify the certificate subject matches the configured host, fall
    /// back to fingerprint.
    HostnameOnly,
}

/// Which key form(s) receive a fingerprint on installation.
///
/// Deployments can pin by network address, by DNS name, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustNameMode {
    /// Install under the resolved `ip:port` only.
    IpOnly,
    /// Install under both key forms (the default).
    #[default]
    IpAndHost,
    /// Install under the configured `host:port` only.
    HostOnly,
}

/// Advisory file-lock parameters for the shared credential files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockParams {
    /// Maximum acquisition attempts.
    pub tries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
    /// Maximum total wait before giving up, in milliseconds.
    pub wait_ms: u64,
}

impl Default for LockParams {
    fn default() -> Self {
        Self {
            tries: 100,
            delay_ms: 300,
            wait_ms: 1000,
        }
    }
}

impl LockParams {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// Configuration for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Explicit tickets-file path; overrides environment and OS default.
    pub tickets_path: Option<PathBuf>,
    /// Explicit trust-file path; overrides environment and OS default.
    pub trust_path: Option<PathBuf>,
    /// Advisory-lock retry parameters for both credential files.
    pub lock: LockParams,
    /// Certificate validation mode for secure connections.
    pub cert_validation: CertValidation,
    /// Which key form(s) fingerprints are installed under.
    pub trust_name_mode: TrustNameMode,
    /// Application name reported in the session environment, if any.
    pub application_name: Option<String>,
    /// Program name sent in the protocol handshake.
    pub program_name: String,
    /// Program version sent in the protocol handshake.
    pub program_version: String,
    /// Process-wide default for tagged output.
    pub tags_enabled: bool,
    /// Sentinel sent when no client workspace name is set.
    pub unset_client_name: String,
    /// Sentinel sent when no user name is set.
    pub unset_user_name: String,
    /// Preferred message language, if any.
    pub text_language: Option<String>,
    /// Override for the local host name reported to the server.
    pub host_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tickets_path: None,
            trust_path: None,
            lock: LockParams::default(),
            cert_validation: CertValidation::default(),
            trust_name_mode: TrustNameMode::default(),
            application_name: None,
            program_name: "meridian".to_string(),
            program_version: env!("CARGO_PKG_VERSION").to_string(),
            tags_enabled: true,
            unset_client_name: "unknownclient".to_string(),
            unset_user_name: "nouser".to_string(),
            text_language: None,
            host_name: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Resolve the tickets-file path: explicit field, `MERIDIAN_TICKETS`,
    /// then `~/.meridian/tickets`.
    pub fn tickets_file(&self) -> Result<PathBuf> {
        resolve_credential_path(self.tickets_path.as_deref(), TICKETS_ENV_VAR, "tickets")
    }

    /// Resolve the trust-file path: explicit field, `MERIDIAN_TRUST`,
    /// then `~/.meridian/trust`.
    pub fn trust_file(&self) -> Result<PathBuf> {
        resolve_credential_path(self.trust_path.as_deref(), TRUST_ENV_VAR, "trust")
    }
}

fn resolve_credential_path(
    explicit: Option<&std::path::Path>,
    env_var: &str,
    default_name: &str,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?;
    Ok(dirs.home_dir().join(".meridian").join(default_name))
}
