//! Proxy configuration.
//!
//! The binary reads [`Args`] from the command line (each flag can also be
//! set through a `TCPAGG_*` environment variable) and turns them into a
//! [`ProxyConfig`], which is all the library needs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::proxy::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CLIENTS, DEFAULT_REPLY_TIMEOUT};

/// Runtime configuration of the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Backend host name or IP address.
    pub backend_host: String,

    /// Backend TCP port.
    pub backend_port: u16,

    /// Address clients connect to.
    pub listen_addr: SocketAddr,

    /// Slot limit; `None` for no limit.
    pub max_clients: Option<usize>,

    /// Upper bound on establishing the backend connection.
    pub connect_timeout: Duration,

    /// Upper bound on waiting for a backend reply.
    pub reply_timeout: Duration,
}

impl ProxyConfig {
    /// Configuration with defaults, listening on all IPv4 interfaces.
    pub fn new(backend_host: impl Into<String>, backend_port: u16, listen_port: u16) -> Self {
        Self {
            backend_host: backend_host.into(),
            backend_port,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), listen_port),
            max_clients: Some(DEFAULT_MAX_CLIENTS),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Relay many request/response TCP clients over one backend connection.
#[derive(Debug, Parser)]
#[command(name = "tcpagg", version, about)]
pub struct Args {
    /// Backend server address.
    #[arg(short = 's', long = "server", env = "TCPAGG_SERVER")]
    pub server: String,

    /// Backend server port.
    #[arg(
        short = 'p',
        long = "server-port",
        env = "TCPAGG_SERVER_PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub server_port: u16,

    /// Port to accept clients on.
    #[arg(
        short = 'l',
        long = "listen-port",
        env = "TCPAGG_LISTEN_PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub listen_port: u16,

    /// Local address to bind the listener to.
    #[arg(long = "bind", env = "TCPAGG_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Maximum simultaneous clients (0 for no limit).
    #[arg(long, env = "TCPAGG_MAX_CLIENTS", default_value_t = DEFAULT_MAX_CLIENTS)]
    pub max_clients: usize,

    /// Backend connect timeout in seconds.
    #[arg(
        long,
        env = "TCPAGG_CONNECT_TIMEOUT_SECS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub connect_timeout_secs: u64,

    /// Backend reply timeout in milliseconds.
    #[arg(
        long,
        env = "TCPAGG_REPLY_TIMEOUT_MS",
        default_value_t = DEFAULT_REPLY_TIMEOUT.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reply_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "TCPAGG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "TCPAGG_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            backend_host: self.server,
            backend_port: self.server_port,
            listen_addr: SocketAddr::new(self.bind, self.listen_port),
            max_clients: (self.max_clients > 0).then_some(self.max_clients),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("tcpagg").chain(args.iter().copied()))
    }

    #[test]
    fn test_required_flags_and_defaults() {
        let config = parse(&["-s", "192.168.1.10", "-p", "502", "-l", "5020"])
            .unwrap()
            .into_config();

        assert_eq!(config.backend_host, "192.168.1.10");
        assert_eq!(config.backend_port, 502);
        assert_eq!(config.listen_addr, "0.0.0.0:5020".parse().unwrap());
        assert_eq!(config.max_clients, Some(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(25));
        assert_eq!(config.reply_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_optional_flags() {
        let config = parse(&[
            "--server",
            "plc.local",
            "--server-port",
            "502",
            "--listen-port",
            "1502",
            "--bind",
            "::1",
            "--max-clients",
            "0",
            "--connect-timeout-secs",
            "3",
            "--reply-timeout-ms",
            "750",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.listen_addr, "[::1]:1502".parse().unwrap());
        assert_eq!(config.max_clients, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.reply_timeout, Duration::from_millis(750));
    }

    #[rstest]
    #[case::missing_server(&["-p", "502", "-l", "5020"])]
    #[case::missing_server_port(&["-s", "10.0.0.1", "-l", "5020"])]
    #[case::missing_listen_port(&["-s", "10.0.0.1", "-p", "502"])]
    #[case::zero_port(&["-s", "10.0.0.1", "-p", "0", "-l", "5020"])]
    #[case::port_out_of_range(&["-s", "10.0.0.1", "-p", "502", "-l", "70000"])]
    #[case::non_numeric_port(&["-s", "10.0.0.1", "-p", "modbus", "-l", "5020"])]
    #[case::zero_reply_timeout(&["-s", "10.0.0.1", "-p", "502", "-l", "5020", "--reply-timeout-ms", "0"])]
    fn test_invalid_arguments(#[case] args: &[&str]) {
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_proxy_config_new() {
        let config = ProxyConfig::new("10.0.0.1", 502, 5020);
        assert_eq!(config.listen_addr.port(), 5020);
        assert!(config.listen_addr.ip().is_unspecified());
        assert_eq!(config.max_clients, Some(DEFAULT_MAX_CLIENTS));
    }
}
