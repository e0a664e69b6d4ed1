//! Node Addresses
//!
//! A node is identified by an opaque address string supplied by the
//! membership layer (e.g. `10.0.3.17:9000`). huddle never interprets the
//! address beyond equality; it is stored verbatim in etcd and handed back
//! to the membership layer when joining.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, stable address of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Wrap an address string verbatim. Used when decoding values we wrote
    /// to the store ourselves; external input goes through [`FromStr`].
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when parsing an externally-supplied address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("node address must be a non-empty string without whitespace")]
pub struct InvalidAddress;

impl FromStr for NodeAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(InvalidAddress);
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_host_port() {
        let addr: NodeAddress = "10.0.3.17:9000".parse().unwrap();
        assert_eq!(addr.as_str(), "10.0.3.17:9000");
        assert_eq!(addr.to_string(), "10.0.3.17:9000");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let addr: NodeAddress = " node-a:9000\n".parse().unwrap();
        assert_eq!(addr.as_str(), "node-a:9000");
    }

    #[test]
    fn rejects_empty_and_internal_whitespace() {
        assert!("".parse::<NodeAddress>().is_err());
        assert!("  ".parse::<NodeAddress>().is_err());
        assert!("a b".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn round_trips_through_store_value() {
        let addr = NodeAddress::new("node-b:9000");
        assert_eq!(NodeAddress::new(addr.to_string()), addr);
    }
}
