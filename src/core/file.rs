//! File metadata carried between peers and the coordinator
//!
//! The coordinator never sees file contents, only these descriptions.

use crate::core::SocketAddress;
use serde::{Deserialize, Serialize};

/// Description of a shared file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileInfo {
    /// File name, unique across the network
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex digest of the whole content
    pub hash: String,
    /// Storage-assigned id, `UNASSIGNED_ID` until registered
    #[serde(default = "unassigned_id")]
    pub id: i64,
}

fn unassigned_id() -> i64 {
    FileInfo::UNASSIGNED_ID
}

impl FileInfo {
    /// Sentinel id for files not yet registered
    pub const UNASSIGNED_ID: i64 = -1;

    /// Create a file description without an id
    pub fn new(name: impl Into<String>, size: u64, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            hash: hash.into(),
            id: Self::UNASSIGNED_ID,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn is_registered(&self) -> bool {
        self.id != Self::UNASSIGNED_ID
    }
}

/// A registered file together with the host that holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub info: FileInfo,
    pub owner: SocketAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_by_default() {
        let info = FileInfo::new("report.pdf", 1024, "abcd");
        assert_eq!(info.id, FileInfo::UNASSIGNED_ID);
        assert!(!info.is_registered());
        assert!(info.with_id(3).is_registered());
    }

    #[test]
    fn test_missing_id_deserializes_as_unassigned() {
        let info: FileInfo =
            serde_json::from_str(r#"{"name":"a.txt","size":3,"hash":"00"}"#).unwrap();
        assert_eq!(info.id, FileInfo::UNASSIGNED_ID);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let res: Result<FileInfo, _> =
            serde_json::from_str(r#"{"name":"a","size":3,"hash":"00","id":1,"extra":true}"#);
        assert!(res.is_err());
    }
}
