//! Message catalog for peer ↔ coordinator communication
//!
//! Every message is a JSON envelope `{"kind": "...", "payload": {...}}`. Each
//! kind has its own payload struct; payloads carrying fields that are not
//! declared for their kind are rejected on decode.

use crate::core::{FileInfo, HostInfo, SocketAddress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(String),
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),
}

/// Discriminator of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ConnectionRequest,
    ConnectionResponse,
    ConnectionLost,
    NewHostConnected,
    NewFileRequest,
    NewFileResponse,
    HostsListRequest,
    HostsListResponse,
    FilesListRequest,
    FilesListResponse,
    GetFileByIdRequest,
    FileContainsRequest,
    FileContainsResponse,
    FileTransactionStartRequest,
    FileTransactionStartResponse,
    FileTransactionFinished,
}

/// Which side is allowed to send a message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToCoordinator,
    ToPeer,
    Either,
}

impl MessageKind {
    pub const ALL: [MessageKind; 16] = [
        MessageKind::ConnectionRequest,
        MessageKind::ConnectionResponse,
        MessageKind::ConnectionLost,
        MessageKind::NewHostConnected,
        MessageKind::NewFileRequest,
        MessageKind::NewFileResponse,
        MessageKind::HostsListRequest,
        MessageKind::HostsListResponse,
        MessageKind::FilesListRequest,
        MessageKind::FilesListResponse,
        MessageKind::GetFileByIdRequest,
        MessageKind::FileContainsRequest,
        MessageKind::FileContainsResponse,
        MessageKind::FileTransactionStartRequest,
        MessageKind::FileTransactionStartResponse,
        MessageKind::FileTransactionFinished,
    ];

    /// Tag used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ConnectionRequest => "ConnectionRequest",
            MessageKind::ConnectionResponse => "ConnectionResponse",
            MessageKind::ConnectionLost => "ConnectionLost",
            MessageKind::NewHostConnected => "NewHostConnected",
            MessageKind::NewFileRequest => "NewFileRequest",
            MessageKind::NewFileResponse => "NewFileResponse",
            MessageKind::HostsListRequest => "HostsListRequest",
            MessageKind::HostsListResponse => "HostsListResponse",
            MessageKind::FilesListRequest => "FilesListRequest",
            MessageKind::FilesListResponse => "FilesListResponse",
            MessageKind::GetFileByIdRequest => "GetFileByIdRequest",
            MessageKind::FileContainsRequest => "FileContainsRequest",
            MessageKind::FileContainsResponse => "FileContainsResponse",
            MessageKind::FileTransactionStartRequest => "FileTransactionStartRequest",
            MessageKind::FileTransactionStartResponse => "FileTransactionStartResponse",
            MessageKind::FileTransactionFinished => "FileTransactionFinished",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MessageKind::ConnectionRequest
            | MessageKind::NewFileRequest
            | MessageKind::HostsListRequest
            | MessageKind::FilesListRequest
            | MessageKind::GetFileByIdRequest
            | MessageKind::FileContainsRequest
            | MessageKind::FileTransactionFinished => Direction::ToCoordinator,

            MessageKind::ConnectionResponse
            | MessageKind::NewHostConnected
            | MessageKind::NewFileResponse
            | MessageKind::HostsListResponse
            | MessageKind::FilesListResponse
            | MessageKind::FileContainsResponse
            | MessageKind::FileTransactionStartResponse => Direction::ToPeer,

            // Start requests are relayed to the holder as well
            MessageKind::ConnectionLost | MessageKind::FileTransactionStartRequest => {
                Direction::Either
            }
        }
    }

    /// Whether a peer may send this kind to the coordinator
    pub fn accepted_by_coordinator(&self) -> bool {
        self.direction() != Direction::ToPeer
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownMessageKind(s.to_string()))
    }
}

/// Announce a host to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionRequest {
    pub host_name: String,
}

/// Outcome of a connection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionResponse {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl ConnectionResponse {
    pub fn approved(broadcast_message: Option<String>) -> Self {
        Self {
            approved: true,
            broadcast_message,
            reject_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            broadcast_message: None,
            reject_reason: Some(reason.into()),
        }
    }
}

/// A connection went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionLost {
    pub reason: String,
}

/// Broadcast when another host joins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewHostConnected {
    pub host_address: SocketAddress,
    pub host_name: String,
}

/// Advertise files held by the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewFileRequest {
    pub file_info_list: Vec<FileInfo>,
}

/// Outcome for one advertised file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewFileResponse {
    pub file_name: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl NewFileResponse {
    pub fn approved(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            approved: true,
            reject_reason: None,
        }
    }

    pub fn rejected(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            approved: false,
            reject_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostsListRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostsListResponse {
    pub approved: bool,
    #[serde(default)]
    pub hosts_list: Vec<HostInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl HostsListResponse {
    pub fn approved(hosts_list: Vec<HostInfo>) -> Self {
        Self {
            approved: true,
            hosts_list,
            reject_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            hosts_list: Vec::new(),
            reject_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesListRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesListResponse {
    pub approved: bool,
    #[serde(default)]
    pub files_list: Vec<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl FilesListResponse {
    pub fn approved(files_list: Vec<FileInfo>) -> Self {
        Self {
            approved: true,
            files_list,
            reject_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            files_list: Vec::new(),
            reject_reason: Some(reason.into()),
        }
    }
}

/// Look up a single file by its storage id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetFileByIdRequest {
    pub file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileContainsRequest {
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileContainsResponse {
    pub contains: bool,
}

/// Ask for a rendezvous with the holder of `file_name`.
///
/// `establish_address` is where the requester waits for the holder to dial in.
/// The coordinator forwards the request unchanged to the holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileTransactionStartRequest {
    pub file_name: String,
    pub establish_address: SocketAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileTransactionStartResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<SocketAddress>,
    pub file_name: String,
    pub started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl FileTransactionStartResponse {
    pub fn started(file_name: impl Into<String>, sender_address: SocketAddress) -> Self {
        Self {
            sender_address: Some(sender_address),
            file_name: file_name.into(),
            started: true,
            reject_reason: None,
        }
    }

    pub fn rejected(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sender_address: None,
            file_name: file_name.into(),
            started: false,
            reject_reason: Some(reason.into()),
        }
    }
}

/// Report that the holder at `sender_address` is done sending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileTransactionFinished {
    pub sender_address: SocketAddress,
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Message {
    ConnectionRequest(ConnectionRequest),
    ConnectionResponse(ConnectionResponse),
    ConnectionLost(ConnectionLost),
    NewHostConnected(NewHostConnected),
    NewFileRequest(NewFileRequest),
    NewFileResponse(NewFileResponse),
    HostsListRequest(HostsListRequest),
    HostsListResponse(HostsListResponse),
    FilesListRequest(FilesListRequest),
    FilesListResponse(FilesListResponse),
    GetFileByIdRequest(GetFileByIdRequest),
    FileContainsRequest(FileContainsRequest),
    FileContainsResponse(FileContainsResponse),
    FileTransactionStartRequest(FileTransactionStartRequest),
    FileTransactionStartResponse(FileTransactionStartResponse),
    FileTransactionFinished(FileTransactionFinished),
}

/// Envelope read before the payload schema is known
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    kind: String,
    payload: serde_json::Value,
}

fn payload<T: DeserializeOwned>(
    kind: MessageKind,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value)
        .map_err(|e| DecodeError::CorruptPayload(format!("{}: {}", kind, e)))
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ConnectionRequest(_) => MessageKind::ConnectionRequest,
            Message::ConnectionResponse(_) => MessageKind::ConnectionResponse,
            Message::ConnectionLost(_) => MessageKind::ConnectionLost,
            Message::NewHostConnected(_) => MessageKind::NewHostConnected,
            Message::NewFileRequest(_) => MessageKind::NewFileRequest,
            Message::NewFileResponse(_) => MessageKind::NewFileResponse,
            Message::HostsListRequest(_) => MessageKind::HostsListRequest,
            Message::HostsListResponse(_) => MessageKind::HostsListResponse,
            Message::FilesListRequest(_) => MessageKind::FilesListRequest,
            Message::FilesListResponse(_) => MessageKind::FilesListResponse,
            Message::GetFileByIdRequest(_) => MessageKind::GetFileByIdRequest,
            Message::FileContainsRequest(_) => MessageKind::FileContainsRequest,
            Message::FileContainsResponse(_) => MessageKind::FileContainsResponse,
            Message::FileTransactionStartRequest(_) => MessageKind::FileTransactionStartRequest,
            Message::FileTransactionStartResponse(_) => MessageKind::FileTransactionStartResponse,
            Message::FileTransactionFinished(_) => MessageKind::FileTransactionFinished,
        }
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes.
    ///
    /// The kind is resolved first so an unknown tag is reported as such rather
    /// than as a generic payload failure.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(data)
            .map_err(|e| DecodeError::CorruptPayload(e.to_string()))?;
        let kind: MessageKind = envelope.kind.parse()?;
        let value = envelope.payload;

        let msg = match kind {
            MessageKind::ConnectionRequest => Message::ConnectionRequest(payload(kind, value)?),
            MessageKind::ConnectionResponse => Message::ConnectionResponse(payload(kind, value)?),
            MessageKind::ConnectionLost => Message::ConnectionLost(payload(kind, value)?),
            MessageKind::NewHostConnected => Message::NewHostConnected(payload(kind, value)?),
            MessageKind::NewFileRequest => Message::NewFileRequest(payload(kind, value)?),
            MessageKind::NewFileResponse => Message::NewFileResponse(payload(kind, value)?),
            MessageKind::HostsListRequest => Message::HostsListRequest(payload(kind, value)?),
            MessageKind::HostsListResponse => Message::HostsListResponse(payload(kind, value)?),
            MessageKind::FilesListRequest => Message::FilesListRequest(payload(kind, value)?),
            MessageKind::FilesListResponse => Message::FilesListResponse(payload(kind, value)?),
            MessageKind::GetFileByIdRequest => Message::GetFileByIdRequest(payload(kind, value)?),
            MessageKind::FileContainsRequest => {
                Message::FileContainsRequest(payload(kind, value)?)
            }
            MessageKind::FileContainsResponse => {
                Message::FileContainsResponse(payload(kind, value)?)
            }
            MessageKind::FileTransactionStartRequest => {
                Message::FileTransactionStartRequest(payload(kind, value)?)
            }
            MessageKind::FileTransactionStartResponse => {
                Message::FileTransactionStartResponse(payload(kind, value)?)
            }
            MessageKind::FileTransactionFinished => {
                Message::FileTransactionFinished(payload(kind, value)?)
            }
        };

        Ok(msg)
    }

    pub fn connection_request(host_name: impl Into<String>) -> Self {
        Message::ConnectionRequest(ConnectionRequest {
            host_name: host_name.into(),
        })
    }

    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Message::ConnectionLost(ConnectionLost {
            reason: reason.into(),
        })
    }

    pub fn hosts_list_request() -> Self {
        Message::HostsListRequest(HostsListRequest {})
    }

    pub fn files_list_request() -> Self {
        Message::FilesListRequest(FilesListRequest {})
    }
}
