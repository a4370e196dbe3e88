//! tcpagg
//!
//! TCP aggregation proxy for request/response protocols.
//!
//! This service:
//! - Connects once to a backend server (for example a Modbus/TCP device)
//! - Accepts many clients on a listening port
//! - Forwards each client request to the backend and relays the reply back
//! - Drops every client and reconnects when the backend connection fails

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use tcpagg_aggregator::{logging, Args, Proxy, ProxyError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level, args.log_json).context("Failed to initialize logging")?;

    let config = args.into_config();
    info!(
        backend_host = %config.backend_host,
        backend_port = config.backend_port,
        listen_addr = %config.listen_addr,
        max_clients = ?config.max_clients,
        reply_timeout_ms = config.reply_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let proxy = Proxy::start(config)
        .await
        .inspect_err(report_fatal)
        .context("Failed to start proxy")?;

    tokio::select! {
        result = proxy.run() => result.inspect_err(report_fatal).context("Proxy stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

fn report_fatal(err: &ProxyError) {
    error!(reason = err.reason_code(), error = %err, "Fatal proxy error");
}
