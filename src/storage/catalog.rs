//! File catalog collaborator
//!
//! The coordinator only needs to know which host holds which file. Real
//! deployments can back this with a database; `MemoryFileStore` keeps the
//! catalog in process.

use crate::core::{FileInfo, FileRecord, SocketAddress};
use std::collections::HashMap;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("file already exists")]
    AlreadyExists(String),
    #[error("invalid file: {0}")]
    InvalidFile(String),
}

/// How a file is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileQuery {
    Name(String),
    Id(i64),
}

/// Catalog of files advertised by connected hosts
pub trait FileStore: Send {
    /// Find a file by name or storage id
    fn lookup_file(&self, query: &FileQuery) -> Option<FileRecord>;

    /// Register a file held by `owner`, returning it with its assigned id
    fn register_file(
        &mut self,
        info: FileInfo,
        owner: SocketAddress,
    ) -> Result<FileInfo, StorageError>;

    /// Forget every file held by `owner`
    fn remove_files_of(&mut self, owner: &SocketAddress) -> Vec<FileInfo>;

    /// All registered files
    fn list_files(&self) -> Vec<FileRecord>;
}

/// In-memory file catalog
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    /// Records keyed by file name
    files: HashMap<String, FileRecord>,
    /// Next id to hand out
    next_id: i64,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryFileStore {
    fn lookup_file(&self, query: &FileQuery) -> Option<FileRecord> {
        match query {
            FileQuery::Name(name) => self.files.get(name).cloned(),
            FileQuery::Id(id) => self.files.values().find(|r| r.info.id == *id).cloned(),
        }
    }

    fn register_file(
        &mut self,
        info: FileInfo,
        owner: SocketAddress,
    ) -> Result<FileInfo, StorageError> {
        if info.name.trim().is_empty() {
            return Err(StorageError::InvalidFile("empty file name".to_string()));
        }

        let id = match self.files.get(&info.name) {
            Some(existing) if existing.owner != owner => {
                return Err(StorageError::AlreadyExists(info.name));
            }
            // Re-announcing a file keeps its id
            Some(existing) => existing.info.id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };

        let info = info.with_id(id);
        log::debug!("Registered file {} (id {}) for {}", info.name, id, owner);
        self.files.insert(
            info.name.clone(),
            FileRecord {
                info: info.clone(),
                owner,
            },
        );

        Ok(info)
    }

    fn remove_files_of(&mut self, owner: &SocketAddress) -> Vec<FileInfo> {
        let names: Vec<String> = self
            .files
            .iter()
            .filter(|(_, r)| &r.owner == owner)
            .map(|(name, _)| name.clone())
            .collect();

        names
            .into_iter()
            .filter_map(|name| self.files.remove(&name))
            .map(|r| r.info)
            .collect()
    }

    fn list_files(&self) -> Vec<FileRecord> {
        self.files.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SocketAddress {
        SocketAddress::new("10.0.0.1", 9000)
    }

    fn bob() -> SocketAddress {
        SocketAddress::new("10.0.0.2", 9000)
    }

    #[test]
    fn test_register_assigns_ids() {
        let mut store = MemoryFileStore::new();
        let a = store
            .register_file(FileInfo::new("a.txt", 1, "00"), alice())
            .unwrap();
        let b = store
            .register_file(FileInfo::new("b.txt", 2, "11"), alice())
            .unwrap();

        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lookup_by_name_and_id() {
        let mut store = MemoryFileStore::new();
        let info = store
            .register_file(FileInfo::new("report.pdf", 10, "ff"), alice())
            .unwrap();

        let by_name = store
            .lookup_file(&FileQuery::Name("report.pdf".into()))
            .unwrap();
        assert_eq!(by_name.owner, alice());

        let by_id = store.lookup_file(&FileQuery::Id(info.id)).unwrap();
        assert_eq!(by_id.info, info);

        assert!(store.lookup_file(&FileQuery::Id(42)).is_none());
        assert!(store
            .lookup_file(&FileQuery::Name("missing".into()))
            .is_none());
    }

    #[test]
    fn test_duplicate_name_from_other_owner() {
        let mut store = MemoryFileStore::new();
        store
            .register_file(FileInfo::new("a.txt", 1, "00"), alice())
            .unwrap();

        let err = store
            .register_file(FileInfo::new("a.txt", 1, "00"), bob())
            .unwrap_err();
        assert_eq!(err.to_string(), "file already exists");
    }

    #[test]
    fn test_reannounce_keeps_id() {
        let mut store = MemoryFileStore::new();
        let first = store
            .register_file(FileInfo::new("a.txt", 1, "00"), alice())
            .unwrap();
        let second = store
            .register_file(FileInfo::new("a.txt", 5, "01"), alice())
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.size, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut store = MemoryFileStore::new();
        assert!(matches!(
            store.register_file(FileInfo::new("  ", 1, "00"), alice()),
            Err(StorageError::InvalidFile(_))
        ));
    }

    #[test]
    fn test_remove_files_of() {
        let mut store = MemoryFileStore::new();
        store
            .register_file(FileInfo::new("a.txt", 1, "00"), alice())
            .unwrap();
        store
            .register_file(FileInfo::new("b.txt", 1, "00"), bob())
            .unwrap();

        let removed = store.remove_files_of(&alice());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "a.txt");
        assert_eq!(store.list_files().len(), 1);

        // Second call is a no-op
        assert!(store.remove_files_of(&alice()).is_empty());
    }
}
