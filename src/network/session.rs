//! Per-peer session
//!
//! One session per accepted connection:
//! `Connecting → Connected → Active → Disconnected`.
//!
//! The session reads messages strictly in order and forwards them to the
//! coordinator. Everything written to the peer (responses, broadcasts,
//! relays) goes through one outbound queue drained by a writer task.

use crate::config::CoordinatorConfig;
use crate::core::SocketAddress;
use crate::network::coordinator::{CoordinatorGone, CoordinatorHandle};
use crate::network::message::{Message, MessageKind};
use crate::network::registry::PeerHandle;
use crate::network::wire::{FrameCodec, WireError};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

/// How long the writer may keep flushing after the session ends
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for an approved `ConnectionRequest`
    Connecting,
    /// Registered with the coordinator
    Connected,
    /// Serving requests
    Active,
    Disconnected,
}

/// Errors that end a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
    #[error("Protocol violation: {kind} not allowed while {state:?}")]
    ProtocolViolation {
        state: SessionState,
        kind: MessageKind,
    },
    #[error("Handshake timed out")]
    HandshakeTimeout,
    #[error("No message within the idle timeout")]
    IdleTimeout,
    #[error("Connection writer closed")]
    WriterClosed,
    #[error(transparent)]
    Coordinator(#[from] CoordinatorGone),
}

impl SessionError {
    /// True when the peer simply went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Wire(e) if e.is_disconnect())
            || matches!(self, SessionError::WriterClosed)
    }
}

/// Session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_payload_size: u32,
    pub handshake_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub outbound_queue: usize,
}

impl From<&CoordinatorConfig> for SessionConfig {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
            handshake_timeout: config.handshake_timeout(),
            idle_timeout: config.idle_timeout(),
            outbound_queue: config.outbound_queue.max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&CoordinatorConfig::default())
    }
}

/// One connected peer
pub struct Session {
    address: SocketAddress,
    state: SessionState,
    host_name: Option<String>,
    coordinator: CoordinatorHandle,
    config: SessionConfig,
}

impl Session {
    pub fn new(
        address: SocketAddress,
        coordinator: CoordinatorHandle,
        config: SessionConfig,
    ) -> Self {
        Self {
            address,
            state: SessionState::Connecting,
            host_name: None,
            coordinator,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until it closes.
    ///
    /// A peer hanging up is a normal outcome and returns `Ok`; framing,
    /// decode and protocol errors close only this connection.
    pub async fn run<S>(mut self, stream: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let framed = Framed::new(stream, FrameCodec::new(self.config.max_payload_size));
        let (mut writer, mut reader) = framed.split();

        let (tx, mut rx) = mpsc::channel::<Message>(self.config.outbound_queue);
        let peer = self.address.clone();
        let mut write_handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = writer.send(msg).await {
                    log::debug!("Write to {} failed: {}", peer, e);
                    break;
                }
            }
        });

        let result = self.serve(&mut reader, &tx).await;

        let reason = match &result {
            Ok(reason) => reason.clone(),
            Err(e) if e.is_disconnect() => "connection closed".to_string(),
            Err(e) => {
                // Let the peer know why before hanging up
                let _ = tx.try_send(Message::connection_lost(e.to_string()));
                e.to_string()
            }
        };

        let who = self.host_name.as_deref().unwrap_or("unregistered peer");
        match &result {
            Ok(_) => log::info!("Peer {} ({}) left: {}", self.address, who, reason),
            Err(e) if e.is_disconnect() => log::info!("Peer {} disconnected", self.address),
            Err(e) => log::warn!("Closing session with {}: {}", self.address, e),
        }

        // A connect may still be queued at the coordinator even if the
        // handshake never finished here, so always release the address.
        self.coordinator
            .disconnect(self.address.clone(), reason)
            .await;
        self.state = SessionState::Disconnected;

        drop(tx);
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut write_handle)
            .await
            .is_err()
        {
            write_handle.abort();
        }

        result.map(|_| ()).or_else(|e| {
            if e.is_disconnect() {
                Ok(())
            } else {
                Err(e)
            }
        })
    }

    /// Handshake then request loop. Returns the peer's reason on a graceful
    /// `ConnectionLost`.
    async fn serve<R>(
        &mut self,
        reader: &mut R,
        tx: &mpsc::Sender<Message>,
    ) -> Result<String, SessionError>
    where
        R: futures::Stream<Item = Result<Message, WireError>> + Unpin,
    {
        match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, self.handshake(reader, tx))
                .await
                .map_err(|_| SessionError::HandshakeTimeout)??,
            None => self.handshake(reader, tx).await?,
        }

        self.state = SessionState::Active;
        log::debug!("Session with {} active", self.address);

        loop {
            let msg = self.next_message(reader, self.config.idle_timeout).await?;
            let kind = msg.kind();

            match msg {
                Message::ConnectionLost(lost) => return Ok(lost.reason),
                _ if kind == MessageKind::ConnectionRequest
                    || !kind.accepted_by_coordinator() =>
                {
                    return Err(SessionError::ProtocolViolation {
                        state: self.state,
                        kind,
                    });
                }
                msg => {
                    let responses = self
                        .coordinator
                        .dispatch(self.address.clone(), msg)
                        .await?;
                    for response in responses {
                        tx.send(response)
                            .await
                            .map_err(|_| SessionError::WriterClosed)?;
                    }
                }
            }
        }
    }

    /// Wait for an approved `ConnectionRequest`. Rejected requests leave the
    /// session in `Connecting` so the peer may try again.
    async fn handshake<R>(
        &mut self,
        reader: &mut R,
        tx: &mpsc::Sender<Message>,
    ) -> Result<(), SessionError>
    where
        R: futures::Stream<Item = Result<Message, WireError>> + Unpin,
    {
        loop {
            let msg = self.next_message(reader, None).await?;
            let request = match msg {
                Message::ConnectionRequest(request) => request,
                other => {
                    return Err(SessionError::ProtocolViolation {
                        state: self.state,
                        kind: other.kind(),
                    })
                }
            };

            let peer = PeerHandle::new(self.address.clone(), tx.clone());
            let response = self
                .coordinator
                .connect(peer, request.host_name.clone())
                .await?;

            if response.approved {
                self.state = SessionState::Connected;
                self.host_name = Some(request.host_name);
                return Ok(());
            }
        }
    }

    async fn next_message<R>(
        &self,
        reader: &mut R,
        limit: Option<Duration>,
    ) -> Result<Message, SessionError>
    where
        R: futures::Stream<Item = Result<Message, WireError>> + Unpin,
    {
        let next = match limit {
            Some(limit) => tokio::time::timeout(limit, reader.next())
                .await
                .map_err(|_| SessionError::IdleTimeout)?,
            None => reader.next().await,
        };

        match next {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(e)) => Err(e.into()),
            // Stream ended on a frame boundary: the peer closed the connection
            None => Err(WireError::EmptyHeader.into()),
        }
    }
}
