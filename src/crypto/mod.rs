//! Hashing utilities
//!
//! Whole-file digests used when peers advertise the files they hold.

pub mod hash;

pub use hash::{digest, file_digest};
