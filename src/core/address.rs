//! Network address value type
//!
//! Hosts are identified by the address the coordinator sees them on.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Missing port in address: {0}")]
    MissingPort(String),
    #[error("Invalid port in address: {0}")]
    InvalidPort(String),
    #[error("Empty host in address: {0}")]
    EmptyHost(String),
}

/// A `(host, port)` pair, rendered as `"host:port"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketAddress {
    pub host: String,
    pub port: u16,
}

impl SocketAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 literals need brackets so the port stays unambiguous
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for SocketAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;

        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl Serialize for SocketAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SocketAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let addr = SocketAddress::new("10.0.0.1", 9000);
        assert_eq!(addr.to_string(), "10.0.0.1:9000");
        assert_eq!("10.0.0.1:9000".parse::<SocketAddress>().unwrap(), addr);
    }

    #[test]
    fn test_ipv6() {
        let std_addr: SocketAddr = "[::1]:7000".parse().unwrap();
        let addr = SocketAddress::from(std_addr);
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:7000");
        assert_eq!(addr.to_string().parse::<SocketAddress>().unwrap(), addr);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "localhost".parse::<SocketAddress>(),
            Err(AddressError::MissingPort(_))
        ));
        assert!(matches!(
            "localhost:abc".parse::<SocketAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            ":80".parse::<SocketAddress>(),
            Err(AddressError::EmptyHost(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let addr = SocketAddress::new("host", 1);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"host:1\"");
        let back: SocketAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
