//! Backend connection management.
//!
//! Exactly one backend connection exists at a time. The connector only
//! knows how to make a connection; when to make one again is decided by
//! the event loop's reconnect path.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ProxyError;

/// Default connect timeout for the backend connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(25);

/// Establishes the outbound connection to the backend server.
#[derive(Debug, Clone)]
pub struct BackendConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl BackendConnector {
    /// Create a connector with the default connect timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a connector with a custom connect timeout.
    pub fn with_timeout(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    /// `host:port` of the backend, for diagnostics.
    pub fn target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Connect once, bounded by the connect timeout. No retry.
    pub async fn connect(&self) -> Result<BackendConnection, ProxyError> {
        self.try_connect()
            .await
            .map_err(|source| ProxyError::BackendUnreachable {
                target: self.target(),
                source,
            })
    }

    pub(crate) async fn try_connect(&self) -> io::Result<BackendConnection> {
        debug!(
            backend = %self.target(),
            timeout_ms = self.connect_timeout.as_millis() as u64,
            "Connecting to backend"
        );

        let stream = match timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(backend = %self.target(), error = %e, "Backend connection failed");
                return Err(e);
            }
            Err(_) => {
                warn!(backend = %self.target(), "Backend connection timed out");
                return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout"));
            }
        };

        let peer_addr = stream.peer_addr()?;
        info!(backend = %self.target(), peer_addr = %peer_addr, "Connected to backend");

        Ok(BackendConnection { stream, peer_addr })
    }
}

/// Why waiting for a backend reply did not produce data.
#[derive(Debug)]
pub enum ReplyError {
    /// Nothing arrived within the reply timeout. The connection is still usable.
    TimedOut,
    /// Backend closed the connection.
    Closed,
    /// Read failed.
    Io(io::Error),
}

/// The live connection to the backend.
#[derive(Debug)]
pub struct BackendConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl BackendConnection {
    /// Resolved address of the backend.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Discard reply bytes already waiting on the socket.
    ///
    /// Anything buffered before a request is sent belongs to an earlier
    /// exchange that timed out. Returns the number of bytes discarded.
    pub fn discard_stale(&mut self) -> Result<usize, ReplyError> {
        let mut scratch = [0u8; 1024];
        let mut discarded = 0;
        loop {
            match self.stream.try_read(&mut scratch) {
                Ok(0) => return Err(ReplyError::Closed),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ReplyError::Io(e)),
            }
        }
        if discarded > 0 {
            debug!(peer_addr = %self.peer_addr, bytes = discarded, "Discarded stale backend reply");
        }
        Ok(discarded)
    }

    /// Forward a request chunk to the backend.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }

    /// Wait up to `reply_timeout` for the backend reply and read one chunk
    /// of it into `buf`.
    pub async fn recv_reply(
        &mut self,
        buf: &mut [u8],
        reply_timeout: Duration,
    ) -> Result<usize, ReplyError> {
        match timeout(reply_timeout, self.stream.read(buf)).await {
            Err(_) => Err(ReplyError::TimedOut),
            Ok(Ok(0)) => Err(ReplyError::Closed),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(ReplyError::Io(e)),
        }
    }

    /// Close the connection, sending FIN if the socket is still writable.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer_addr = %self.peer_addr, error = %e, "Backend shutdown failed");
        }
    }
}
