use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    process::Command,
    sync::Arc,
    time::Duration,
};

use pathrelay::gateway::{InMemoryRegistry, SessionOptions, SessionRegistry};
use pathrelay::net::BufferPool;
use pathrelay::relay::{self, RelayState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// -----------------------------------------------------------------------------
// ----- Ports -----------------------------------------------------------------

#[allow(dead_code)]
pub fn reserve_port(host: &str) -> u16 {
    let addr = format!("{host}:0");
    let listener = StdTcpListener::bind(&addr).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

#[allow(dead_code)]
pub async fn wait_for_listen(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("nothing started listening on {addr}");
}

// -----------------------------------------------------------------------------
// ----- Backends --------------------------------------------------------------

/// Echoes every connection back to itself until the peer closes.
#[allow(dead_code)]
pub async fn spawn_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
                let _ = w.shutdown().await;
            });
        }
    });

    addr
}

/// Sends `payload` to every connection, then closes it.
#[allow(dead_code)]
pub async fn spawn_source_backend(payload: Arc<Vec<u8>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let payload = payload.clone();
            tokio::spawn(async move {
                let _ = stream.write_all(&payload).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

/// Accepts one connection and hands it to the test.
#[allow(dead_code)]
pub async fn spawn_manual_backend() -> (SocketAddr, tokio::sync::oneshot::Receiver<tokio::net::TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let _ = tx.send(stream);
        }
    });

    (addr, rx)
}

// -----------------------------------------------------------------------------
// ----- In-process relay ------------------------------------------------------

#[allow(dead_code)]
pub struct TestRelay {
    pub addrs: Vec<SocketAddr>,
    pub registry: Arc<dyn SessionRegistry>,
    pub cancel: CancellationToken,
}

#[allow(dead_code)]
impl TestRelay {
    pub fn base(&self, i: usize) -> String {
        format!("http://{}", self.addrs[i])
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.addrs.iter().map(|a| a.to_string()).collect()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One relay process serving `listeners` addresses from a single registry.
#[allow(dead_code)]
pub async fn start_relay(listeners: usize, chanlen: usize, buffsize: usize) -> TestRelay {
    let mut bound = Vec::with_capacity(listeners);
    let mut addrs = Vec::with_capacity(listeners);
    for _ in 0..listeners {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        addrs.push(listener.local_addr().unwrap());
        bound.push(listener);
    }

    let registry: Arc<dyn SessionRegistry> = Arc::new(InMemoryRegistry::new());
    let state = RelayState::new(
        registry.clone(),
        BufferPool::new(buffsize),
        SessionOptions {
            chanlen,
            ..SessionOptions::default()
        },
    );

    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = relay::serve(bound, state, serve_cancel).await;
    });

    TestRelay {
        addrs,
        registry,
        cancel,
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

#[allow(dead_code)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[allow(dead_code)]
pub async fn read_exactly(stream: &mut tokio::net::TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(20), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading")
        .expect("read failed");
    buf
}

#[allow(dead_code)]
pub fn spawn_pathrelay(args: &[&str]) -> std::process::Child {
    let exe = env!("CARGO_BIN_EXE_pathrelay");

    Command::new(exe)
        .args(args)
        .env("PATHRELAY_LOG", "warn")
        .spawn()
        .expect("spawn pathrelay")
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
