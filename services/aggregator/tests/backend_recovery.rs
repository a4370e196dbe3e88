
use std::sync::atomic::Ordering;
use std::time::Duration;

use harness::{
    dead_addr, exchange, is_closed_by_proxy, test_config, wait_for_count, Behavior, ProxyHandle,
    ScriptedBackend, CLOSE_COMMAND,
};
use tcpagg_aggregator::{Proxy, ProxyError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[tokio::test]
async fn backend_loss_closes_all_clients_and_reconnects() {
    let backend = ScriptedBackend::spawn(Behavior::Echo).await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr).await.unwrap();

    let mut client_a = proxy.connect().await;
    let mut client_b = proxy.connect().await;
    assert_eq!(exchange(&mut client_a, b"a").await.unwrap(), b"a");
    assert_eq!(exchange(&mut client_b, b"b").await.unwrap(), b"b");

    // Backend drops the connection mid-exchange.
    client_a.write_all(CLOSE_COMMAND).await.unwrap();

    assert!(is_closed_by_proxy(&mut client_a).await);
    assert!(is_closed_by_proxy(&mut client_b).await);
    assert!(wait_for_count(&proxy.stats.backend_reconnects, 1).await);

    let mut client_c = proxy.connect().await;
    assert_eq!(exchange(&mut client_c, b"c").await.unwrap(), b"c");

    assert_eq!(backend.connection_count(), 2);
    assert_eq!(proxy.stats.backend_failures.load(Ordering::Relaxed), 1);
    assert_eq!(proxy.stats.connections_active.load(Ordering::Relaxed), 1);
    assert_eq!(proxy.stats.connections_closed.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn failed_reconnect_stops_the_proxy() {
    let mut backend = ScriptedBackend::spawn(Behavior::Echo).await.unwrap();
    let mut proxy = ProxyHandle::spawn(backend.addr).await.unwrap();

    let mut client = proxy.connect().await;
    assert_eq!(exchange(&mut client, b"ping").await.unwrap(), b"ping");

    backend.stop_accepting().await;
    client.write_all(CLOSE_COMMAND).await.unwrap();

    let result = proxy
        .join(Duration::from_secs(3))
        .await
        .expect("proxy should stop after failed reconnect");
    assert!(
        matches!(result, Err(ProxyError::ReconnectFailed { .. })),
        "unexpected result: {result:?}"
    );
    assert!(is_closed_by_proxy(&mut client).await);
    assert_eq!(proxy.stats.backend_reconnects.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn startup_fails_when_backend_unreachable() {
    let config = test_config(dead_addr().await);

    let err = Proxy::start(config).await.err().expect("start should fail");
    assert!(
        matches!(err, ProxyError::BackendUnreachable { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn startup_fails_when_listen_address_taken() {
    let backend = ScriptedBackend::spawn(Behavior::Echo).await.unwrap();
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = test_config(backend.addr);
    config.listen_addr = occupied.local_addr().unwrap();

    let err = Proxy::start(config).await.err().expect("start should fail");
    assert!(
        matches!(err, ProxyError::Bind { .. } | ProxyError::Listen { .. }),
        "unexpected error: {err}"
    );
}
