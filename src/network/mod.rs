//! Coordinator networking
//!
//! Provides the signaling layer between peers and the coordinator.
//!
//! # Features
//! - Fixed 64-byte frame headers
//! - Tagged message catalog with per-kind payload schemas
//! - Per-peer sessions with handshake and request loop
//! - Host registry with join/leave broadcasts
//! - File transaction rendezvous

pub mod client;
pub mod coordinator;
pub mod header;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod transaction;
pub mod wire;

pub use client::{Client, ClientError};
pub use coordinator::{Coordinator, CoordinatorGone, CoordinatorHandle, CoordinatorStatus};
pub use header::{CryptMode, FrameError, FrameHeader, HEADER_SIZE};
pub use message::{DecodeError, Direction, Message, MessageKind};
pub use registry::{HostEntry, HostRegistry, PeerHandle, RegistryRejection};
pub use server::Server;
pub use session::{Session, SessionConfig, SessionError, SessionState};
pub use transaction::{
    Transaction, TransactionCoordinator, TransactionRejection, TransactionState,
};
pub use wire::{receive, send, FrameCodec, WireError};
