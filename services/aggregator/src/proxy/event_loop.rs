//! The proxy event loop.
//!
//! A single future owns all proxy state: the listener, the client table and
//! the backend connection. Each iteration rebuilds the set of sockets to
//! watch, waits until any of them is ready, accepts at most one client and
//! then walks the ready clients in slot order. A backend-fatal relay result
//! tears every client down and reconnects before the next iteration.

use std::future::pending;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use futures_util::future::select_all;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::backend::{BackendConnection, BackendConnector};
use super::clients::{ClientConn, ClientTable};
use super::listener::bind_and_listen;
use super::relay::{handle_client_ready, ClientFailure, RelayOutcome, RELAY_CHUNK_SIZE};
use super::stats::ProxyStats;
use crate::config::ProxyConfig;
use crate::error::ProxyError;

/// Pause after a failed accept so persistent errors do not spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Slots watched during one iteration, in dispatch order.
#[derive(Debug, Default)]
pub struct ReadinessSet {
    slots: Vec<usize>,
}

impl ReadinessSet {
    /// Snapshot the occupied slots of `clients`.
    pub fn rebuild<T>(clients: &ClientTable<T>) -> Self {
        Self {
            slots: clients.indices(),
        }
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// What woke the loop up.
enum Activity {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    ClientsReadable,
}

/// The aggregation proxy and all of its state.
pub struct Proxy {
    config: ProxyConfig,
    connector: BackendConnector,
    backend: Option<BackendConnection>,
    listener: TcpListener,
    clients: ClientTable<ClientConn>,
    stats: Arc<ProxyStats>,
}

impl Proxy {
    /// Connect to the backend, then bind the client listener.
    pub async fn start(config: ProxyConfig) -> Result<Self, ProxyError> {
        let connector = BackendConnector::with_timeout(
            config.backend_host.clone(),
            config.backend_port,
            config.connect_timeout,
        );
        let backend = connector.connect().await?;
        let listener = bind_and_listen(config.listen_addr)?;

        Ok(Self {
            clients: ClientTable::new(config.max_clients),
            connector,
            backend: Some(backend),
            listener,
            config,
            stats: Arc::new(ProxyStats::default()),
        })
    }

    /// Address the client listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the relay counters.
    pub fn stats(&self) -> Arc<ProxyStats> {
        Arc::clone(&self.stats)
    }

    /// Serve clients until the backend is lost and cannot be reconnected.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let listen_addr = self.local_addr().map_err(ProxyError::LocalAddr)?;
        info!(
            listen_addr = %listen_addr,
            backend = %self.connector.target(),
            max_clients = ?self.clients.capacity(),
            "Proxy running"
        );

        let mut buf = vec![0u8; RELAY_CHUNK_SIZE];
        loop {
            let ready = ReadinessSet::rebuild(&self.clients);

            match self.wait_for_activity(&ready).await {
                Activity::Accepted(Ok((stream, peer_addr))) => self.admit(stream, peer_addr),
                Activity::Accepted(Err(e)) => {
                    error!(error = %e, "Accept on listening socket failed");
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
                Activity::ClientsReadable => {}
            }

            self.dispatch(&ready, &mut buf).await?;
        }
    }

    /// Block until the listener or any watched client is readable.
    async fn wait_for_activity(&self, ready: &ReadinessSet) -> Activity {
        let clients = ready
            .slots()
            .iter()
            .filter_map(|&index| self.clients.get(index))
            .map(|client| Box::pin(client.stream.readable()))
            .collect::<Vec<_>>();

        let any_readable = async move {
            if clients.is_empty() {
                pending::<()>().await;
            } else {
                // Errors surface on the following read attempt.
                let _ = select_all(clients).await;
            }
        };

        tokio::select! {
            accepted = self.listener.accept() => Activity::Accepted(accepted),
            () = any_readable => Activity::ClientsReadable,
        }
    }

    /// Place an accepted client in a slot, or close it when the table is full.
    fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        match self.clients.insert(ClientConn::new(stream, peer_addr)) {
            Ok(slot) => {
                self.stats.slot_opened();
                info!(slot, peer_addr = %peer_addr, active = self.clients.len(), "Client connected");
            }
            Err(rejected) => {
                ProxyStats::incr(&self.stats.connections_rejected);
                warn!(
                    peer_addr = %rejected.peer_addr,
                    max_clients = ?self.clients.capacity(),
                    "Client rejected: no free slot"
                );
                drop(rejected);
            }
        }
    }

    /// Relay for every watched client that has data, in slot order.
    async fn dispatch(&mut self, ready: &ReadinessSet, buf: &mut [u8]) -> Result<(), ProxyError> {
        for &slot in ready.slots() {
            let Some(backend) = self.backend.as_mut() else {
                break;
            };
            let Some(client) = self.clients.get_mut(slot) else {
                continue;
            };

            let outcome = handle_client_ready(
                client,
                backend,
                self.config.reply_timeout,
                buf,
                &self.stats,
            )
            .await;

            match outcome {
                RelayOutcome::NotReady | RelayOutcome::Continue => {}
                RelayOutcome::ClientClosed => {
                    if let Some(client) = self.free_slot(slot) {
                        info!(slot, peer_addr = %client.peer_addr, "Client disconnected");
                    }
                }
                RelayOutcome::ClientError(failure) => {
                    ProxyStats::incr(&self.stats.client_errors);
                    if matches!(failure, ClientFailure::ReplyTimeout) {
                        ProxyStats::incr(&self.stats.reply_timeouts);
                    }
                    if let Some(client) = self.free_slot(slot) {
                        warn!(
                            slot,
                            peer_addr = %client.peer_addr,
                            error = %failure,
                            "Closing client"
                        );
                    }
                }
                RelayOutcome::BackendFatal(failure) => {
                    ProxyStats::incr(&self.stats.backend_failures);
                    error!(
                        slot,
                        backend = %self.connector.target(),
                        error = %failure,
                        "Backend failure, closing all clients"
                    );
                    self.reconnect().await?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn free_slot(&mut self, slot: usize) -> Option<ClientConn> {
        let client = self.clients.free(slot)?;
        self.stats.slots_closed(1);
        Some(client)
    }

    /// Drop every client and the backend, then connect to the backend once.
    async fn reconnect(&mut self) -> Result<(), ProxyError> {
        let closed = self.clients.free_all();
        self.stats.slots_closed(closed);

        if let Some(old) = self.backend.take() {
            old.close().await;
        }
        debug!(clients_closed = closed, "Backend connection dropped");

        let backend = self
            .connector
            .try_connect()
            .await
            .map_err(|source| ProxyError::ReconnectFailed {
                target: self.connector.target(),
                source,
            })?;

        ProxyStats::incr(&self.stats.backend_reconnects);
        info!(
            backend = %self.connector.target(),
            peer_addr = %backend.peer_addr(),
            clients_closed = closed,
            "Reconnected to backend"
        );
        self.backend = Some(backend);
        Ok(())
    }
}
