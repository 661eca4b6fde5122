//! TCP server
//!
//! Accepts peer connections and runs one session task per connection.

use crate::config::CoordinatorConfig;
use crate::network::coordinator::{Coordinator, CoordinatorHandle};
use crate::network::session::{Session, SessionConfig};
use crate::storage::FileStore;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Coordinator server
pub struct Server {
    listener: TcpListener,
    coordinator: CoordinatorHandle,
    session_config: SessionConfig,
}

impl Server {
    /// Bind the listener and start the coordinator
    pub async fn bind(
        config: &CoordinatorConfig,
        store: Box<dyn FileStore>,
    ) -> Result<Self, std::io::Error> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        log::info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            coordinator: Coordinator::new(config, store).spawn(),
            session_config: SessionConfig::from(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Handle to the coordinator (status queries)
    pub fn coordinator(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }

    /// Accept forever. A failing session never stops the loop.
    pub async fn run(self) -> Result<(), std::io::Error> {
        loop {
            match self.accept().await {
                Ok((stream, addr)) => {
                    log::info!("Incoming connection from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                    }

                    let session = Session::new(
                        addr.into(),
                        self.coordinator.clone(),
                        self.session_config.clone(),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = session.run(stream).await {
                            log::debug!("Session with {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                }
            }
        }
    }
}
