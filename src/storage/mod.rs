//! Storage collaborator for file lookups

pub mod catalog;

pub use catalog::{FileQuery, FileStore, MemoryFileStore, StorageError};
