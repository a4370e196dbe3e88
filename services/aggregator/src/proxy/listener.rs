//! Listening socket setup and client admission.

use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

use crate::error::ProxyError;

/// Listen backlog for the client socket.
pub const LISTEN_BACKLOG: u32 = 5;

/// Create the client-facing listener with address reuse enabled.
pub fn bind_and_listen(addr: SocketAddr) -> Result<TcpListener, ProxyError> {
    let bind_err = |source: io::Error| ProxyError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;

    let listener = socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| ProxyError::Listen { addr, source })?;
    let local_addr = listener.local_addr().map_err(ProxyError::LocalAddr)?;

    info!(bind_addr = %local_addr, backlog = LISTEN_BACKLOG, "Listener bound");
    Ok(listener)
}
