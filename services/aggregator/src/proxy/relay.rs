//! Request/reply relay for one ready client.
//!
//! One exchange is: read a chunk from the client, forward it to the
//! backend, wait (bounded) for one chunk of reply, hand it back. The
//! backend is never shared between two outstanding exchanges because the
//! event loop awaits each exchange to completion. Reply bytes left over from
//! a timed-out exchange are discarded before the next request is forwarded.

use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::backend::{BackendConnection, ReplyError};
use super::clients::ClientConn;
use super::stats::ProxyStats;

/// Maximum bytes moved per read/forward.
pub const RELAY_CHUNK_SIZE: usize = 256;

/// Default wait for a backend reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of handling one ready client.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Readiness was spurious; no data was available.
    NotReady,
    /// Exchange completed; the client stays connected.
    Continue,
    /// Client closed its side.
    ClientClosed,
    /// Failure local to this client. Only its slot is torn down.
    ClientError(ClientFailure),
    /// The backend connection is unusable. Every slot is torn down.
    BackendFatal(BackendFailure),
}

/// Client-local failure causes.
#[derive(Debug)]
pub enum ClientFailure {
    Read(io::Error),
    ReplyTimeout,
    Write(io::Error),
}

/// Backend-fatal failure causes.
#[derive(Debug)]
pub enum BackendFailure {
    Send(io::Error),
    Closed,
    Read(io::Error),
}

impl std::fmt::Display for ClientFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientFailure::Read(e) => write!(f, "client read failed: {e}"),
            ClientFailure::ReplyTimeout => write!(f, "no reply from backend in time"),
            ClientFailure::Write(e) => write!(f, "forwarding reply to client failed: {e}"),
        }
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendFailure::Send(e) => write!(f, "forwarding to backend failed: {e}"),
            BackendFailure::Closed => write!(f, "backend closed the connection"),
            BackendFailure::Read(e) => write!(f, "reading from backend failed: {e}"),
        }
    }
}

/// Relay one request from `client` through `backend` and back.
///
/// The client read is non-blocking; the backend reply wait and the write
/// back to the client are each bounded by `reply_timeout`. `buf` must be at least one byte; at most
/// [`RELAY_CHUNK_SIZE`] bytes of it are used.
pub async fn handle_client_ready(
    client: &mut ClientConn,
    backend: &mut BackendConnection,
    reply_timeout: Duration,
    buf: &mut [u8],
    stats: &ProxyStats,
) -> RelayOutcome {
    let limit = buf.len().min(RELAY_CHUNK_SIZE);
    let buf = &mut buf[..limit];

    let request_len = match client.stream.try_read(buf) {
        Ok(0) => return RelayOutcome::ClientClosed,
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return RelayOutcome::NotReady,
        Err(e) => return RelayOutcome::ClientError(ClientFailure::Read(e)),
    };
    trace!(peer_addr = %client.peer_addr, bytes = request_len, "Request from client");

    match backend.discard_stale() {
        Ok(n) => ProxyStats::add(&stats.stale_bytes_discarded, n),
        Err(ReplyError::Io(e)) => return RelayOutcome::BackendFatal(BackendFailure::Read(e)),
        Err(_) => return RelayOutcome::BackendFatal(BackendFailure::Closed),
    }

    if let Err(e) = backend.send(&buf[..request_len]).await {
        return RelayOutcome::BackendFatal(BackendFailure::Send(e));
    }
    ProxyStats::add(&stats.bytes_to_backend, request_len);

    let reply_len = match backend.recv_reply(buf, reply_timeout).await {
        Ok(n) => n,
        Err(ReplyError::TimedOut) => {
            return RelayOutcome::ClientError(ClientFailure::ReplyTimeout)
        }
        Err(ReplyError::Closed) => return RelayOutcome::BackendFatal(BackendFailure::Closed),
        Err(ReplyError::Io(e)) => return RelayOutcome::BackendFatal(BackendFailure::Read(e)),
    };

    match timeout(reply_timeout, client.stream.write_all(&buf[..reply_len])).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return RelayOutcome::ClientError(ClientFailure::Write(e)),
        Err(_) => {
            return RelayOutcome::ClientError(ClientFailure::Write(io::Error::new(
                io::ErrorKind::TimedOut,
                "client not reading",
            )))
        }
    }
    ProxyStats::add(&stats.bytes_from_backend, reply_len);
    ProxyStats::incr(&stats.requests_relayed);

    debug!(
        peer_addr = %client.peer_addr,
        request_bytes = request_len,
        reply_bytes = reply_len,
        "Exchange relayed"
    );
    RelayOutcome::Continue
}
