//! Peer identity type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// `host:port` identity of an overlay node.
///
/// Used as the key in the overlay count map and as the origin marker on
/// count-dissemination messages, so a node can recognize its own message
/// after it has circled the ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    host: String,
    port: u16,
}

impl PeerAddr {
    /// Create a new peer address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listener port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error parsing a `host:port` string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerAddrParseError {
    /// Missing the `:` separator.
    #[error("missing ':' separator in peer address {0:?}")]
    MissingSeparator(String),

    /// Port component did not parse as a u16.
    #[error("invalid port in peer address {0:?}")]
    InvalidPort(String),

    /// Host component is empty.
    #[error("empty host in peer address {0:?}")]
    EmptyHost(String),
}

impl FromStr for PeerAddr {
    type Err = PeerAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // rsplit so IPv6-style hosts with colons keep everything before the
        // last separator as the host part
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PeerAddrParseError::MissingSeparator(s.to_string()))?;
        if host.is_empty() {
            return Err(PeerAddrParseError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| PeerAddrParseError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let addr = PeerAddr::new("worker-3.local", 9042);
        let parsed: PeerAddr = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        let err = "worker-3.local".parse::<PeerAddr>().unwrap_err();
        assert!(matches!(err, PeerAddrParseError::MissingSeparator(_)));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        let err = "host:notaport".parse::<PeerAddr>().unwrap_err();
        assert!(matches!(err, PeerAddrParseError::InvalidPort(_)));
    }

    #[test]
    fn test_parse_rejects_empty_host() {
        let err = ":9000".parse::<PeerAddr>().unwrap_err();
        assert!(matches!(err, PeerAddrParseError::EmptyHost(_)));
    }
}
