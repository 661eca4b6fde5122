//! Core value types
//!
//! Immutable records shared by every layer:
//! - Socket addresses (host identity)
//! - Host descriptions
//! - File descriptions and storage records

pub mod address;
pub mod file;
pub mod host;

pub use address::{AddressError, SocketAddress};
pub use file::{FileInfo, FileRecord};
pub use host::HostInfo;
