//! TCP aggregation proxy.
//!
//! Many clients, one backend connection. Each client sends a request and
//! waits for exactly one reply; the proxy forwards requests to the backend
//! one at a time and routes each reply back to whoever asked.
//!
//! ## Architecture
//!
//! ```text
//! Clients -> Listener -> ClientTable -> event loop -> relay -> Backend
//!                                            |
//!                              backend lost: close all clients, reconnect
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tcpagg_aggregator::{Proxy, ProxyConfig};
//!
//! let config = ProxyConfig::new("192.168.1.10", 502, 5020);
//! let proxy = Proxy::start(config).await?;
//! proxy.run().await?;
//! ```

mod backend;
mod clients;
mod event_loop;
mod listener;
mod relay;
mod stats;

pub use backend::{BackendConnection, BackendConnector, ReplyError, DEFAULT_CONNECT_TIMEOUT};
pub use clients::{ClientConn, ClientTable, DEFAULT_MAX_CLIENTS};
pub use event_loop::{Proxy, ReadinessSet};
pub use listener::{bind_and_listen, LISTEN_BACKLOG};
pub use relay::{
    handle_client_ready, BackendFailure, ClientFailure, RelayOutcome, DEFAULT_REPLY_TIMEOUT,
    RELAY_CHUNK_SIZE,
};
pub use stats::ProxyStats;
