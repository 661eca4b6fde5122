//! p2pstorage: signaling coordinator for a peer-to-peer storage network
//!
//! Peers connect to the coordinator over TCP, announce themselves, advertise
//! the files they hold and ask for rendezvous with other holders. File bytes
//! never pass through the coordinator; it only hands out addresses.
//!
//! # Example
//!
//! ```no_run
//! use p2pstorage::config::CoordinatorConfig;
//! use p2pstorage::network::Server;
//! use p2pstorage::storage::MemoryFileStore;
//!
//! # async fn run() -> std::io::Result<()> {
//! let config = CoordinatorConfig::default();
//! let server = Server::bind(&config, Box::new(MemoryFileStore::new())).await?;
//! server.run().await
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use config::CoordinatorConfig;
pub use core::{FileInfo, FileRecord, HostInfo, SocketAddress};
pub use network::{Client, Message, MessageKind, Server};
pub use storage::{FileStore, MemoryFileStore};
