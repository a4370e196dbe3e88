//! Error types for the aggregation proxy.
//!
//! Only fatal conditions are errors. Per-client failures and backend
//! failures during relay are classified as [`RelayOutcome`] values and
//! handled inside the event loop.
//!
//! [`RelayOutcome`]: crate::proxy::RelayOutcome

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Fatal proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Initial connection to the backend could not be established.
    #[error("backend {target} unreachable: {source}")]
    BackendUnreachable {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Bound socket could not be switched to listening.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Local address of the listener could not be read.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    /// Backend was lost and the single reconnect attempt failed.
    #[error("reconnect to backend {target} failed: {source}")]
    ReconnectFailed {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl ProxyError {
    /// Short reason code for log fields.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProxyError::BackendUnreachable { .. } => "backend_unreachable",
            ProxyError::Bind { .. } => "bind_failed",
            ProxyError::Listen { .. } => "listen_failed",
            ProxyError::LocalAddr(_) => "local_addr_failed",
            ProxyError::ReconnectFailed { .. } => "reconnect_failed",
        }
    }
}
