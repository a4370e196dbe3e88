pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;

pub use config::{Args, ProxyConfig};
pub use error::ProxyError;
pub use proxy::{
    BackendConnection, BackendConnector, ClientTable, Proxy, ProxyStats, RelayOutcome,
};
