//! Broker accept loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use super::connection::BrokerConnection;
use super::publisher::Publisher;
use crate::error::BrokerError;
use crate::log::EventLog;
use crate::registry::ConsumerRegistry;

/// Accepts TCP connections and spawns one [`BrokerConnection`] per socket,
/// wiring each to the shared event log, consumer registry, and publisher.
///
/// Cheap to clone: every field is an `Arc`, so a listener can be shared
/// across the accept loop and test harnesses alike.
#[derive(Clone)]
pub struct BrokerListener {
    log: Arc<EventLog>,
    registry: Arc<ConsumerRegistry>,
    publisher: Arc<Publisher>,
    next_connection_id: Arc<AtomicU64>,
}

impl Default for BrokerListener {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerListener {
    pub fn new() -> Self {
        let registry = Arc::new(ConsumerRegistry::new());
        let log = Arc::new(EventLog::new());
        let publisher = Arc::new(Publisher::new(registry.clone()));
        Self {
            log,
            registry,
            publisher,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Binds to `port` on all interfaces. A bind failure is fatal at
    /// startup.
    pub async fn bind(&self, port: u16) -> Result<(TcpListener, SocketAddr), BrokerError> {
        let addr = format!("0.0.0.0:{port}");
        let listener =
            TcpListener::bind(&addr)
                .await
                .map_err(|source| BrokerError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
        let local_addr = listener.local_addr().map_err(|source| BrokerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        Ok((listener, local_addr))
    }

    /// Runs the accept loop against an already-bound listener, forever.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BrokerError> {
        loop {
            let (stream, peer): (TcpStream, SocketAddr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "failed to accept connection");
                    continue;
                }
            };

            let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            tracing::info!(connection = id, %peer, "accepted connection");

            let connection = BrokerConnection::new(
                id,
                stream,
                self.log.clone(),
                self.registry.clone(),
                self.publisher.clone(),
            );
            tokio::spawn(connection.run());
        }
    }

    /// Binds `port` and serves it forever. Convenience wrapper around
    /// [`BrokerListener::bind`] + [`BrokerListener::serve`] for the broker
    /// binary.
    pub async fn start(&self, port: u16) -> Result<(), BrokerError> {
        let (listener, addr) = self.bind(port).await?;
        tracing::info!(%addr, "broker listening");
        self.serve(listener).await
    }
}
