//! Connected host description

use crate::core::SocketAddress;
use serde::{Deserialize, Serialize};

/// A peer known to the coordinator. Identity is the address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostInfo {
    /// Name announced in the connection request
    pub name: String,
    /// Address the coordinator sees the host on
    pub address: SocketAddress,
}

impl HostInfo {
    pub fn new(name: impl Into<String>, address: SocketAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}
