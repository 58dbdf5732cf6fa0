//! Line-record format shared by the tickets and trust files.
//!
//! One record per line: `serverKey=userName:value`. The server key may
//! itself contain a colon (`host:port`), so the `=` separates key from
//! the rest and the first `:` after it separates user from value.

/// One parsed credential-file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    /// `ip:port`, `host:port`, or a server id.
    pub server: String,
    /// User name, or a reserved slot sentinel in the trust file.
    pub user: String,
    /// Opaque ticket or fingerprint value.
    pub value: String,
}

impl AuthRecord {
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            value: value.into(),
        }
    }

    /// Parse one line; returns `None` for blank or malformed lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (server, rest) = line.split_once('=')?;
        let (user, value) = rest.split_once(':')?;
        if server.is_empty() || user.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(server, user, value))
    }

    /// Render the record in file form (no trailing newline).
    pub fn render(&self) -> String {
        format!("{}={}:{}", self.server, self.user, self.value)
    }

    /// Whether this record is keyed by the given (server, user) pair.
    pub fn is_keyed_by(&self, server: &str, user: &str) -> bool {
        self.server == server && self.user == user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let record = AuthRecord::new("srv.example:1666", "alice", "tok123");
        let parsed = AuthRecord::parse_line(&record.render()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn server_key_may_contain_colon() {
        let parsed = AuthRecord::parse_line("10.0.0.1:1666=++++++:AB:CD:EF").unwrap();
        assert_eq!(parsed.server, "10.0.0.1:1666");
        assert_eq!(parsed.user, "++++++");
        // The value keeps its own colons intact.
        assert_eq!(parsed.value, "AB:CD:EF");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(AuthRecord::parse_line("").is_none());
        assert!(AuthRecord::parse_line("   ").is_none());
        assert!(AuthRecord::parse_line("# comment").is_none());
        assert!(AuthRecord::parse_line("no separators here").is_none());
        assert!(AuthRecord::parse_line("server=uservalue").is_none());
        assert!(AuthRecord::parse_line("server=user:").is_none());
    }
}
