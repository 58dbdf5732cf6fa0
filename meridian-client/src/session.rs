//! Per-connection protocol session negotiation.
//!
//! Decides whether tagged output is used for a command and builds the
//! environment descriptor that accompanies it. Neither decision is
//! persisted; a descriptor is derived per command invocation and
//! discarded.

use std::collections::HashMap;

use crate::config::ClientConfig;

/// Default client API level advertised in the handshake.
pub const DEFAULT_CLIENT_API_LEVEL: u32 = 92;

/// Default server API level assumed until negotiation says otherwise.
pub const DEFAULT_SERVER_API_LEVEL: u32 = 99_999;

/// Environment token for Windows clients.
pub const ENV_WINDOWS_SPEC: &str = "NT";

/// Environment token for everything else.
pub const ENV_UNIX_SPEC: &str = "UNIX";

/// Sentinel host name when the local host cannot be determined.
pub const ENV_NOHOST_SPEC: &str = "nohost";

/// Request-map key overriding the tagged-output decision for one command.
pub const USE_TAGS_OVERRIDE_KEY: &str = "useTags";

/// Commands that never use tagged output.
const LOGIN_FAMILY: [&str; 2] = ["login", "login2"];

/// Streaming commands whose output must stay untagged.
const STREAM_DENYLIST: [&str; 4] = ["describe", "diff2", "print", "protect"];

/// Environment descriptor sent with each command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDescriptor {
    pub host: String,
    pub os: String,
    pub client: String,
    pub user: String,
    pub language: String,
}

/// Per-connection protocol decisions.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    client_api_level: u32,
    server_api_level: u32,
    tags_default: bool,
    unset_client_name: String,
    unset_user_name: String,
    text_language: Option<String>,
}

impl SessionNegotiator {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client_api_level: DEFAULT_CLIENT_API_LEVEL,
            server_api_level: DEFAULT_SERVER_API_LEVEL,
            tags_default: config.tags_enabled,
            unset_client_name: config.unset_client_name.clone(),
            unset_user_name: config.unset_user_name.clone(),
            text_language: config.text_language.clone(),
        }
    }

    pub fn client_api_level(&self) -> u32 {
        self.client_api_level
    }

    pub fn set_client_api_level(&mut self, level: u32) {
        self.client_api_level = level;
    }

    pub fn server_api_level(&self) -> u32 {
        self.server_api_level
    }

    pub fn set_server_api_level(&mut self, level: u32) {
        self.server_api_level = level;
    }

    /// Whether `cmd_name` uses tagged output.
    ///
    /// Login-family commands never do, overrides notwithstanding. An
    /// explicit `useTags` entry in the request map takes precedence over
    /// the stream denylist and the process default, and is removed from
    /// the map as a side effect so it never leaks into command arguments.
    pub fn use_tags(
        &self,
        cmd_name: &str,
        request_map: &mut HashMap<String, String>,
        is_stream_cmd: bool,
    ) -> bool {
        let cmd = cmd_name.to_ascii_lowercase();
        if LOGIN_FAMILY.contains(&cmd.as_str()) {
            return false;
        }
        if let Some(value) = request_map.remove(USE_TAGS_OVERRIDE_KEY) {
            return value.eq_ignore_ascii_case("true");
        }
        if is_stream_cmd && STREAM_DENYLIST.contains(&cmd.as_str()) {
            return false;
        }
        self.tags_default
    }

    /// Build the environment descriptor for one command.
    ///
    /// Unset fields fall back to their configured sentinels; the OS is
    /// mapped to one of the two protocol tokens.
    pub fn environment(
        &self,
        local_host: Option<&str>,
        client_name: Option<&str>,
        user_name: Option<&str>,
    ) -> EnvDescriptor {
        EnvDescriptor {
            host: non_blank(local_host)
                .unwrap_or(ENV_NOHOST_SPEC)
                .to_string(),
            os: os_spec(std::env::consts::OS),
            client: non_blank(client_name)
                .unwrap_or(&self.unset_client_name)
                .to_string(),
            user: non_blank(user_name)
                .unwrap_or(&self.unset_user_name)
                .to_string(),
            language: self.text_language.clone().unwrap_or_default(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn os_spec(platform: &str) -> String {
    if platform.to_ascii_lowercase().contains("windows") {
        ENV_WINDOWS_SPEC.to_string()
    } else {
        ENV_UNIX_SPEC.to_string()
    }
}
