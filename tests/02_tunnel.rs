mod support;

use std::net::SocketAddr;
use std::time::Duration;

use pathrelay::config::{TunnelClientConfig, TunnelServerConfig};
use pathrelay::net::PathSpec;
use pathrelay::tunnel;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use support::{
    pattern, read_exactly, reserve_port, spawn_echo_backend, spawn_pathrelay, wait_for_listen,
};

fn local_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], reserve_port("127.0.0.1")))
}

#[tokio::test]
async fn tunnel_round_trip_over_two_paths() {
    let echo = spawn_echo_backend().await;
    let cancel = CancellationToken::new();

    let server_cfg = TunnelServerConfig {
        listen: local_addr(),
        remote: echo.to_string(),
        backoff: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
    };
    let server_addr = server_cfg.listen;
    let server_cancel = cancel.clone();
    tokio::spawn(async move { tunnel::server::run(&server_cfg, server_cancel).await });
    wait_for_listen(server_addr).await;

    // The first path leads nowhere; the dialer fails over to the second.
    let dead = local_addr();
    let client_cfg = TunnelClientConfig {
        listen: local_addr(),
        paths: vec![
            PathSpec::new("dead", dead.to_string()),
            PathSpec::new("live", server_addr.to_string()),
        ],
        backoff: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
    };
    let client_addr = client_cfg.listen;
    let client_cancel = cancel.clone();
    tokio::spawn(async move { tunnel::client::run(&client_cfg, client_cancel).await });
    wait_for_listen(client_addr).await;

    for _ in 0..3 {
        let mut conn = TcpStream::connect(client_addr).await.unwrap();
        let payload = pattern(64 * 1024);
        conn.write_all(&payload).await.unwrap();
        assert_eq!(read_exactly(&mut conn, payload.len()).await, payload);
    }

    cancel.cancel();
}

#[tokio::test]
async fn relay_binary_serves_health() {
    let addr = local_addr();
    let mut child = spawn_pathrelay(&["relay", "--listen", &addr.to_string()]);

    wait_for_listen(addr).await;
    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let _ = child.kill();
    let _ = child.wait();
    assert_eq!(body, "sessions=0");
}
