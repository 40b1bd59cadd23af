//! ICE configuration for new peer connections.

/// Fallback when no STUN servers are configured.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// STUN server hints applied verbatim to every new peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceConfig {
    stun_servers: Vec<String>,
}

impl IceConfig {
    /// Build from an explicit server list; an empty list falls back to
    /// [`DEFAULT_STUN_SERVER`].
    #[must_use]
    pub fn new(stun_servers: Vec<String>) -> Self {
        if stun_servers.is_empty() {
            Self::default()
        } else {
            Self { stun_servers }
        }
    }

    /// Parse the comma-delimited `STUN_SERVERS`-style setting supplied at
    /// startup. `None`, the empty string and stray commas all fall back
    /// to the default server.
    #[must_use]
    pub fn from_delimited(raw: Option<&str>) -> Self {
        let servers = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self::new(servers)
    }

    /// The configured STUN urls, never empty.
    #[must_use]
    pub fn stun_servers(&self) -> &[String] {
        &self.stun_servers
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_owned()],
        }
    }
}
