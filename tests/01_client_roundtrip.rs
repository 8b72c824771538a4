mod support;

use std::sync::Arc;
use std::time::Duration;

use pathrelay::client::{self, RelayClient, relay_connection};
use pathrelay::gateway::SessionRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use support::{pattern, read_exactly, spawn_echo_backend, spawn_source_backend, start_relay};

const MIB: usize = 1024 * 1024;

/// Starts the client accept loop on an ephemeral port.
async fn start_client(endpoints: Vec<String>, service: String, cancel: &CancellationToken) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay_client = RelayClient::new(&endpoints).unwrap();

    tokio::spawn(client::serve(listener, relay_client, service, MIB, cancel.clone()));
    TcpStream::connect(addr).await.unwrap()
}

#[tokio::test]
async fn hello_through_client_and_relay() {
    let echo = spawn_echo_backend().await;
    let relay = start_relay(1, 100, MIB).await;
    let cancel = CancellationToken::new();

    let mut local = start_client(relay.endpoints(), echo.to_string(), &cancel).await;
    local.write_all(b"hello").await.unwrap();
    assert_eq!(read_exactly(&mut local, 5).await, b"hello");

    cancel.cancel();
}

#[tokio::test]
async fn echo_stays_ordered_across_many_paths() {
    let echo = spawn_echo_backend().await;
    let relay = start_relay(4, 100, 16 * 1024).await;
    let cancel = CancellationToken::new();

    let mut local = start_client(relay.endpoints(), echo.to_string(), &cancel).await;
    let payload = pattern(512 * 1024);

    let (mut rd, mut wr) = local.split();
    let expected = payload.clone();
    let (_, got) = tokio::join!(
        async {
            for chunk in payload.chunks(7 * 1024) {
                wr.write_all(chunk).await.unwrap();
            }
        },
        async {
            let mut got = vec![0u8; expected.len()];
            tokio::time::timeout(Duration::from_secs(30), rd.read_exact(&mut got))
                .await
                .expect("echo timed out")
                .unwrap();
            got
        }
    );
    assert_eq!(got, expected);

    cancel.cancel();
}

#[tokio::test]
async fn two_mib_download_with_chanlen_one() {
    let payload = Arc::new(pattern(2 * MIB));
    let source = spawn_source_backend(payload.clone()).await;
    let relay = start_relay(2, 1, MIB).await;
    let cancel = CancellationToken::new();

    let mut local = start_client(relay.endpoints(), source.to_string(), &cancel).await;

    let mut got = Vec::with_capacity(2 * MIB);
    tokio::time::timeout(Duration::from_secs(30), local.read_to_end(&mut got))
        .await
        .expect("download timed out")
        .unwrap();
    assert_eq!(got.len(), payload.len());
    assert_eq!(&got, payload.as_ref());

    cancel.cancel();
}

#[tokio::test]
async fn local_eof_tears_the_session_down() {
    let echo = spawn_echo_backend().await;
    let relay = start_relay(2, 100, MIB).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut local = TcpStream::connect(addr).await.unwrap();
    let (accepted, _) = listener.accept().await.unwrap();

    let relay_client = RelayClient::new(&relay.endpoints()).unwrap();
    let cancel = CancellationToken::new();
    let service = echo.to_string();
    let task = tokio::spawn(async move {
        relay_connection(accepted, relay_client, &service, MIB, &cancel).await
    });

    local.write_all(b"ping").await.unwrap();
    assert_eq!(read_exactly(&mut local, 4).await, b"ping");
    local.shutdown().await.unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("connection did not finish")
        .unwrap()
        .unwrap();
    assert_eq!(stats.sent, 4);
    assert_eq!(stats.received, 4);
    assert!(relay.registry.lookup(&stats.id).is_err());
}
