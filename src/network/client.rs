//! Peer-side connection to a coordinator
//!
//! Performs the handshake and pairs requests with responses. Notifications
//! that arrive while a response is awaited are kept for later `receive` calls.

use crate::config::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::core::SocketAddress;
use crate::network::message::{ConnectionResponse, Message, MessageKind};
use crate::network::wire::{self, WireError};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
    #[error("Connection rejected: {0}")]
    Rejected(String),
    #[error("Unexpected {0} during handshake")]
    UnexpectedMessage(MessageKind),
}

/// A connected, approved peer
pub struct Client {
    stream: TcpStream,
    local: SocketAddress,
    pending: VecDeque<Message>,
    max_payload: u32,
}

impl Client {
    /// Connect to the coordinator at `addr` and announce `host_name`
    pub async fn connect(
        addr: &str,
        host_name: &str,
    ) -> Result<(Self, ConnectionResponse), ClientError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        let local: SocketAddress = stream
            .local_addr()
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?
            .into();

        wire::send(&mut stream, &Message::connection_request(host_name)).await?;
        let response = match wire::receive(&mut stream, DEFAULT_MAX_PAYLOAD_SIZE).await? {
            Message::ConnectionResponse(response) => response,
            other => return Err(ClientError::UnexpectedMessage(other.kind())),
        };

        if !response.approved {
            return Err(ClientError::Rejected(
                response
                    .reject_reason
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        log::debug!("Connected to {} as {}", addr, host_name);
        let client = Self {
            stream,
            local,
            pending: VecDeque::new(),
            max_payload: DEFAULT_MAX_PAYLOAD_SIZE,
        };
        Ok((client, response))
    }

    /// Our address as the coordinator sees it
    pub fn local_address(&self) -> &SocketAddress {
        &self.local
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), WireError> {
        wire::send(&mut self.stream, msg).await
    }

    /// Next message, oldest buffered notification first
    pub async fn receive(&mut self) -> Result<Message, WireError> {
        match self.pending.pop_front() {
            Some(msg) => Ok(msg),
            None => wire::receive(&mut self.stream, self.max_payload).await,
        }
    }

    /// Next message of `kind`; anything else is buffered
    pub async fn receive_kind(&mut self, kind: MessageKind) -> Result<Message, WireError> {
        if let Some(pos) = self.pending.iter().position(|m| m.kind() == kind) {
            if let Some(msg) = self.pending.remove(pos) {
                return Ok(msg);
            }
        }

        loop {
            let msg = wire::receive(&mut self.stream, self.max_payload).await?;
            if msg.kind() == kind {
                return Ok(msg);
            }
            self.pending.push_back(msg);
        }
    }

    /// Send a request and wait for the response of kind `expected`
    pub async fn request(
        &mut self,
        msg: &Message,
        expected: MessageKind,
    ) -> Result<Message, WireError> {
        self.send(msg).await?;
        self.receive_kind(expected).await
    }

    /// Announce departure and close the socket
    pub async fn close(mut self, reason: &str) -> Result<(), WireError> {
        self.send(&Message::connection_lost(reason)).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
