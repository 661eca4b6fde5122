//! Host registry
//!
//! Table of currently connected hosts keyed by address, plus the outbound
//! queue of each host's session so the coordinator can push notifications.

use crate::core::{HostInfo, SocketAddress};
use crate::network::message::{Message, NewHostConnected};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Business-level reasons for refusing a connection.
/// `Display` is the reason string sent back to the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryRejection {
    #[error("already connected")]
    AlreadyConnected,
    #[error("host limit reached")]
    CapacityReached,
    #[error("invalid host name")]
    InvalidHostName,
}

/// Handle for sending messages to a connected session
#[derive(Clone, Debug)]
pub struct PeerHandle {
    pub address: SocketAddress,
    tx: mpsc::Sender<Message>,
}

impl PeerHandle {
    pub fn new(address: SocketAddress, tx: mpsc::Sender<Message>) -> Self {
        Self { address, tx }
    }

    /// Queue a message without waiting. A full or closed queue drops it.
    pub fn deliver(&self, msg: Message) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                log::warn!(
                    "Outbound queue of {} full, dropping {}",
                    self.address,
                    msg.type_name()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// A registered host
#[derive(Debug, Clone)]
pub struct HostEntry {
    pub info: HostInfo,
    pub connected_at: DateTime<Utc>,
    handle: PeerHandle,
}

/// Connected hosts
pub struct HostRegistry {
    hosts: HashMap<SocketAddress, HostEntry>,
    max_hosts: usize,
    broadcast_message: Option<String>,
}

impl HostRegistry {
    pub fn new(max_hosts: usize, broadcast_message: Option<String>) -> Self {
        Self {
            hosts: HashMap::new(),
            max_hosts,
            broadcast_message,
        }
    }

    /// Register a host and announce it to everyone else.
    ///
    /// Returns the broadcast message configured for new hosts.
    pub fn connect(
        &mut self,
        handle: PeerHandle,
        host_name: &str,
    ) -> Result<Option<String>, RegistryRejection> {
        let address = handle.address.clone();

        if self.hosts.contains_key(&address) {
            return Err(RegistryRejection::AlreadyConnected);
        }
        if host_name.trim().is_empty() {
            return Err(RegistryRejection::InvalidHostName);
        }
        if self.hosts.len() >= self.max_hosts {
            return Err(RegistryRejection::CapacityReached);
        }

        let info = HostInfo::new(host_name, address.clone());
        self.hosts.insert(
            address.clone(),
            HostEntry {
                info,
                connected_at: Utc::now(),
                handle,
            },
        );
        log::info!("Host {} connected from {}", host_name, address);

        let announcement = Message::NewHostConnected(NewHostConnected {
            host_address: address.clone(),
            host_name: host_name.to_string(),
        });
        self.broadcast_except(&announcement, &address);

        Ok(self.broadcast_message.clone())
    }

    /// Remove a host. Unknown addresses are ignored.
    pub fn disconnect(&mut self, address: &SocketAddress) -> Option<HostInfo> {
        let entry = self.hosts.remove(address)?;
        log::info!(
            "Host {} at {} removed after {}s",
            entry.info.name,
            address,
            (Utc::now() - entry.connected_at).num_seconds()
        );
        Some(entry.info)
    }

    /// Snapshot of every connected host
    pub fn list_hosts(&self) -> Vec<HostInfo> {
        self.hosts.values().map(|e| e.info.clone()).collect()
    }

    pub fn get(&self, address: &SocketAddress) -> Option<&HostEntry> {
        self.hosts.get(address)
    }

    pub fn contains(&self, address: &SocketAddress) -> bool {
        self.hosts.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Send a message to one host
    pub fn send_to(&self, address: &SocketAddress, msg: Message) -> bool {
        match self.hosts.get(address) {
            Some(entry) => entry.handle.deliver(msg),
            None => false,
        }
    }

    /// Send a message to every host except one; returns how many got it
    pub fn broadcast_except(&self, msg: &Message, except: &SocketAddress) -> usize {
        self.hosts
            .iter()
            .filter(|(addr, _)| *addr != except)
            .filter(|(_, entry)| entry.handle.deliver(msg.clone()))
            .count()
    }
}
