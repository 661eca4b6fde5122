//! Coordinator actor
//!
//! Single owner of the host registry, the transaction table and the file
//! catalog. Sessions never touch that state directly; they send commands over
//! a channel and the actor applies them one at a time, so every
//! read-modify-write sequence (connect, disconnect, start, finish) is atomic.

use crate::config::CoordinatorConfig;
use crate::core::SocketAddress;
use crate::network::message::{
    ConnectionResponse, FileContainsResponse, FileTransactionStartRequest,
    FileTransactionStartResponse, FilesListResponse, HostsListResponse, Message,
    NewFileResponse,
};
use crate::network::registry::{HostRegistry, PeerHandle};
use crate::network::transaction::{TransactionCoordinator, TransactionRejection};
use crate::storage::{FileQuery, FileStore};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Command queue depth
const COMMAND_QUEUE: usize = 1000;

/// The actor task has stopped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("coordinator is not running")]
pub struct CoordinatorGone;

/// Snapshot of coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub hosts: usize,
    pub files: usize,
    pub transactions: usize,
}

enum Command {
    Connect {
        peer: PeerHandle,
        host_name: String,
        reply: oneshot::Sender<ConnectionResponse>,
    },
    Dispatch {
        from: SocketAddress,
        message: Message,
        reply: oneshot::Sender<Vec<Message>>,
    },
    Disconnect {
        address: SocketAddress,
        reason: String,
    },
    Status {
        reply: oneshot::Sender<CoordinatorStatus>,
    },
}

/// Cloneable handle used by sessions to reach the coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Register a host. The response is also queued on the peer's own channel
    /// before any broadcast can reach it.
    pub async fn connect(
        &self,
        peer: PeerHandle,
        host_name: String,
    ) -> Result<ConnectionResponse, CoordinatorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Connect {
                peer,
                host_name,
                reply,
            })
            .await
            .map_err(|_| CoordinatorGone)?;
        rx.await.map_err(|_| CoordinatorGone)
    }

    /// Handle a request from an active host; returns the responses to send back
    pub async fn dispatch(
        &self,
        from: SocketAddress,
        message: Message,
    ) -> Result<Vec<Message>, CoordinatorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Dispatch {
                from,
                message,
                reply,
            })
            .await
            .map_err(|_| CoordinatorGone)?;
        rx.await.map_err(|_| CoordinatorGone)
    }

    /// Tell the coordinator a session ended
    pub async fn disconnect(&self, address: SocketAddress, reason: String) {
        if self
            .tx
            .send(Command::Disconnect { address, reason })
            .await
            .is_err()
        {
            log::debug!("Coordinator already stopped, disconnect dropped");
        }
    }

    pub async fn status(&self) -> Result<CoordinatorStatus, CoordinatorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .await
            .map_err(|_| CoordinatorGone)?;
        rx.await.map_err(|_| CoordinatorGone)
    }
}

/// Owner of all shared coordinator state
pub struct Coordinator {
    registry: HostRegistry,
    transactions: TransactionCoordinator,
    store: Box<dyn FileStore>,
}

impl Coordinator {
    pub fn new(config: &CoordinatorConfig, store: Box<dyn FileStore>) -> Self {
        Self {
            registry: HostRegistry::new(config.max_hosts, config.broadcast_message.clone()),
            transactions: TransactionCoordinator::new(),
            store,
        }
    }

    /// Start the actor task. It stops once every handle is dropped.
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        tokio::spawn(self.run(rx));
        CoordinatorHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        log::debug!("Coordinator started");
        while let Some(cmd) = rx.recv().await {
            self.handle_command(cmd);
        }
        log::debug!("Coordinator stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                peer,
                host_name,
                reply,
            } => {
                let response = self.connect(peer, &host_name);
                let _ = reply.send(response);
            }
            Command::Dispatch {
                from,
                message,
                reply,
            } => {
                let responses = self.dispatch(&from, message);
                let _ = reply.send(responses);
            }
            Command::Disconnect { address, reason } => {
                self.disconnect(&address, &reason);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Handshake: register the host and queue the response on its channel
    pub fn connect(&mut self, peer: PeerHandle, host_name: &str) -> ConnectionResponse {
        let address = peer.address.clone();
        let response = match self.registry.connect(peer.clone(), host_name) {
            Ok(broadcast) => ConnectionResponse::approved(broadcast),
            Err(e) => {
                log::info!("Rejected connection of {} from {}: {}", host_name, address, e);
                ConnectionResponse::rejected(e.to_string())
            }
        };

        peer.deliver(Message::ConnectionResponse(response.clone()));
        response
    }

    /// Business handling for every peer→coordinator request kind
    pub fn dispatch(&mut self, from: &SocketAddress, message: Message) -> Vec<Message> {
        log::debug!("Dispatching {} from {}", message.type_name(), from);

        match message {
            Message::HostsListRequest(_) => vec![Message::HostsListResponse(
                HostsListResponse::approved(self.registry.list_hosts()),
            )],

            Message::FilesListRequest(_) => {
                let files = self
                    .store
                    .list_files()
                    .into_iter()
                    .filter(|r| self.registry.contains(&r.owner))
                    .map(|r| r.info)
                    .collect();
                vec![Message::FilesListResponse(FilesListResponse::approved(
                    files,
                ))]
            }

            Message::GetFileByIdRequest(req) => {
                let response = match self.store.lookup_file(&FileQuery::Id(req.file_id)) {
                    Some(record) if self.registry.contains(&record.owner) => {
                        FilesListResponse::approved(vec![record.info])
                    }
                    _ => FilesListResponse::rejected(
                        TransactionRejection::FileNotFound.to_string(),
                    ),
                };
                vec![Message::FilesListResponse(response)]
            }

            Message::FileContainsRequest(req) => {
                let contains = self
                    .store
                    .lookup_file(&FileQuery::Name(req.file_name))
                    .map(|r| self.registry.contains(&r.owner))
                    .unwrap_or(false);
                vec![Message::FileContainsResponse(FileContainsResponse {
                    contains,
                })]
            }

            Message::NewFileRequest(req) => req
                .file_info_list
                .into_iter()
                .map(|info| {
                    let name = info.name.clone();
                    let response = match self.store.register_file(info, from.clone()) {
                        Ok(_) => NewFileResponse::approved(name),
                        Err(e) => NewFileResponse::rejected(name, e.to_string()),
                    };
                    Message::NewFileResponse(response)
                })
                .collect(),

            Message::FileTransactionStartRequest(req) => {
                vec![Message::FileTransactionStartResponse(
                    self.start_transaction(from, req),
                )]
            }

            Message::FileTransactionFinished(msg) => {
                self.transactions.finish_transaction(&msg.sender_address);
                Vec::new()
            }

            other => {
                log::warn!("Ignoring {} from {}", other.type_name(), from);
                Vec::new()
            }
        }
    }

    fn start_transaction(
        &mut self,
        from: &SocketAddress,
        req: FileTransactionStartRequest,
    ) -> FileTransactionStartResponse {
        let registry = &self.registry;
        let result = self.transactions.start_transaction(
            &req.file_name,
            from,
            req.establish_address.clone(),
            self.store.as_ref(),
            |addr| registry.contains(addr),
        );

        match result {
            Ok(transaction) => {
                // The holder dials the requester's establish address
                let file_name = req.file_name.clone();
                if !self
                    .registry
                    .send_to(&transaction.holder, Message::FileTransactionStartRequest(req))
                {
                    log::warn!(
                        "Could not relay transaction for {} to holder {}",
                        file_name,
                        transaction.holder
                    );
                }
                FileTransactionStartResponse::started(file_name, transaction.holder)
            }
            Err(e) => {
                log::debug!("Transaction for {} from {} rejected: {}", req.file_name, from, e);
                FileTransactionStartResponse::rejected(req.file_name, e.to_string())
            }
        }
    }

    /// Release everything tied to `address` and tell the remaining hosts
    pub fn disconnect(&mut self, address: &SocketAddress, reason: &str) {
        self.transactions.discard_host(address);
        let removed = self.store.remove_files_of(address);
        if !removed.is_empty() {
            log::debug!("Removed {} file(s) held by {}", removed.len(), address);
        }

        if let Some(info) = self.registry.disconnect(address) {
            let notice = Message::connection_lost(format!(
                "host {} at {} disconnected: {}",
                info.name, address, reason
            ));
            self.registry.broadcast_except(&notice, address);
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            hosts: self.registry.len(),
            files: self.store.list_files().len(),
            transactions: self.transactions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileInfo;
    use crate::network::message::{FileTransactionFinished, GetFileByIdRequest, NewFileRequest};
    use crate::network::session::{Session, SessionConfig, SessionError};
    use crate::network::wire::send;
    use crate::storage::MemoryFileStore;
    use std::time::Duration;

    struct TestPeer {
        address: SocketAddress,
        rx: mpsc::Receiver<Message>,
    }

    impl TestPeer {
        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(m) = self.rx.try_recv() {
                out.push(m);
            }
            out
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(
            &CoordinatorConfig::default(),
            Box::new(MemoryFileStore::new()),
        )
    }

    fn join(c: &mut Coordinator, host: &str, port: u16, name: &str) -> TestPeer {
        let (tx, rx) = mpsc::channel(32);
        let address = SocketAddress::new(host, port);
        let response = c.connect(PeerHandle::new(address.clone(), tx), name);
        assert!(response.approved);
        let mut peer = TestPeer { address, rx };
        // Drop the queued ConnectionResponse
        assert!(matches!(
            peer.drain().first(),
            Some(Message::ConnectionResponse(_))
        ));
        peer
    }

    fn share(c: &mut Coordinator, peer: &TestPeer, name: &str) {
        let responses = c.dispatch(
            &peer.address,
            Message::NewFileRequest(NewFileRequest {
                file_info_list: vec![FileInfo::new(name, 100, "cafe")],
            }),
        );
        assert_eq!(
            responses,
            vec![Message::NewFileResponse(NewFileResponse::approved(name))]
        );
    }

    fn start(c: &mut Coordinator, peer: &TestPeer, name: &str) -> FileTransactionStartResponse {
        let mut responses = c.dispatch(
            &peer.address,
            Message::FileTransactionStartRequest(FileTransactionStartRequest {
                file_name: name.to_string(),
                establish_address: SocketAddress::new(peer.address.host.clone(), 5000),
            }),
        );
        match responses.pop() {
            Some(Message::FileTransactionStartResponse(r)) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejected_connect_is_queued_too() {
        let mut c = coordinator();
        let alice = join(&mut c, "10.0.0.1", 9000, "alice");

        let (tx, mut rx) = mpsc::channel(4);
        let response = c.connect(PeerHandle::new(alice.address.clone(), tx), "alice");
        assert_eq!(response.reject_reason.as_deref(), Some("already connected"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::ConnectionResponse(response)
        );
    }

    #[test]
    fn test_rendezvous_relays_to_holder() {
        let mut c = coordinator();
        let mut alice = join(&mut c, "10.0.0.1", 9000, "alice");
        let bob = join(&mut c, "10.0.0.2", 9000, "bob");
        alice.drain();
        share(&mut c, &alice, "report.pdf");

        let response = start(&mut c, &bob, "report.pdf");
        assert!(response.started);
        assert_eq!(response.sender_address, Some(alice.address.clone()));

        match alice.drain().pop() {
            Some(Message::FileTransactionStartRequest(req)) => {
                assert_eq!(req.file_name, "report.pdf");
                assert_eq!(req.establish_address, SocketAddress::new("10.0.0.2", 5000));
            }
            other => panic!("holder not notified: {:?}", other),
        }

        let again = start(&mut c, &bob, "report.pdf");
        assert_eq!(again.reject_reason.as_deref(), Some("transaction in progress"));
    }

    #[test]
    fn test_finish_then_noop() {
        let mut c = coordinator();
        let alice = join(&mut c, "10.0.0.1", 9000, "alice");
        let bob = join(&mut c, "10.0.0.2", 9000, "bob");
        share(&mut c, &alice, "report.pdf");
        start(&mut c, &bob, "report.pdf");
        assert_eq!(c.status().transactions, 1);

        let finished = Message::FileTransactionFinished(FileTransactionFinished {
            sender_address: alice.address.clone(),
        });
        assert!(c.dispatch(&bob.address, finished.clone()).is_empty());
        assert_eq!(c.status().transactions, 0);

        assert!(c.dispatch(&bob.address, finished).is_empty());
        assert_eq!(c.status().transactions, 0);
    }

    #[test]
    fn test_disconnect_discards_and_broadcasts() {
        let mut c = coordinator();
        let alice = join(&mut c, "10.0.0.1", 9000, "alice");
        let mut bob = join(&mut c, "10.0.0.2", 9000, "bob");
        share(&mut c, &alice, "report.pdf");
        assert!(start(&mut c, &bob, "report.pdf").started);
        bob.drain();

        c.disconnect(&alice.address, "connection closed");

        assert_eq!(
            c.status(),
            CoordinatorStatus {
                hosts: 1,
                files: 0,
                transactions: 0
            }
        );
        match bob.drain().pop() {
            Some(Message::ConnectionLost(lost)) => assert!(lost.reason.contains("alice")),
            other => panic!("expected ConnectionLost, got {:?}", other),
        }

        let retry = start(&mut c, &bob, "report.pdf");
        assert_eq!(retry.reject_reason.as_deref(), Some("file not found"));

        // Disconnecting again changes nothing
        c.disconnect(&alice.address, "again");
        assert_eq!(c.status().hosts, 1);
    }

    #[test]
    fn test_file_queries() {
        let mut c = coordinator();
        let alice = join(&mut c, "10.0.0.1", 9000, "alice");
        share(&mut c, &alice, "report.pdf");

        let contains = c.dispatch(
            &alice.address,
            Message::FileContainsRequest(crate::network::message::FileContainsRequest {
                file_name: "report.pdf".into(),
            }),
        );
        assert_eq!(
            contains,
            vec![Message::FileContainsResponse(FileContainsResponse {
                contains: true
            })]
        );

        match c.dispatch(&alice.address, Message::files_list_request()).pop() {
            Some(Message::FilesListResponse(r)) => {
                assert!(r.approved);
                assert_eq!(r.files_list.len(), 1);
                assert_eq!(r.files_list[0].id, 0);
            }
            other => panic!("unexpected {:?}", other),
        }

        match c
            .dispatch(
                &alice.address,
                Message::GetFileByIdRequest(GetFileByIdRequest { file_id: 0 }),
            )
            .pop()
        {
            Some(Message::FilesListResponse(r)) => {
                assert_eq!(r.files_list[0].name, "report.pdf")
            }
            other => panic!("unexpected {:?}", other),
        }

        match c
            .dispatch(
                &alice.address,
                Message::GetFileByIdRequest(GetFileByIdRequest { file_id: 99 }),
            )
            .pop()
        {
            Some(Message::FilesListResponse(r)) => {
                assert!(!r.approved);
                assert_eq!(r.reject_reason.as_deref(), Some("file not found"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_file_from_other_host() {
        let mut c = coordinator();
        let alice = join(&mut c, "10.0.0.1", 9000, "alice");
        let bob = join(&mut c, "10.0.0.2", 9000, "bob");
        share(&mut c, &alice, "report.pdf");

        let responses = c.dispatch(
            &bob.address,
            Message::NewFileRequest(NewFileRequest {
                file_info_list: vec![FileInfo::new("report.pdf", 1, "00")],
            }),
        );
        assert_eq!(
            responses,
            vec![Message::NewFileResponse(NewFileResponse::rejected(
                "report.pdf",
                "file already exists"
            ))]
        );
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let handle = coordinator().spawn();
        let (tx, mut rx) = mpsc::channel(8);
        let address = SocketAddress::new("127.0.0.1", 4000);

        let response = handle
            .connect(PeerHandle::new(address.clone(), tx), "alice".into())
            .await
            .unwrap();
        assert!(response.approved);
        assert!(matches!(
            rx.recv().await,
            Some(Message::ConnectionResponse(_))
        ));

        let hosts = handle
            .dispatch(address.clone(), Message::hosts_list_request())
            .await
            .unwrap();
        assert!(matches!(&hosts[..], [Message::HostsListResponse(r)] if r.hosts_list.len() == 1));

        handle.disconnect(address, "bye".into()).await;
        assert_eq!(handle.status().await.unwrap().hosts, 0);
    }

    #[tokio::test]
    async fn test_handshake_timeout_during_connect_leaves_no_host() {
        let (tx, mut commands) = mpsc::channel(8);
        let handle = CoordinatorHandle { tx };
        let config = SessionConfig {
            handshake_timeout: Some(Duration::from_millis(50)),
            ..SessionConfig::default()
        };
        let (mut client, server) = tokio::io::duplex(4096);
        let session = Session::new(SocketAddress::new("127.0.0.1", 40001), handle, config);
        let task = tokio::spawn(session.run(server));

        send(&mut client, &Message::connection_request("alice"))
            .await
            .unwrap();

        // Hold the connect back until the session has given up on it
        let held = commands.recv().await.unwrap();
        assert!(matches!(held, Command::Connect { .. }));
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::HandshakeTimeout));

        let mut c = coordinator();
        c.handle_command(held);
        while let Ok(cmd) = commands.try_recv() {
            c.handle_command(cmd);
        }
        assert_eq!(c.status().hosts, 0);
    }
}
