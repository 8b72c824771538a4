//! Frame relay endpoint: owns sessions and answers `create` / `read` /
//! `write` / `close` over HTTP.

pub mod server;

pub use server::{FRAME_SEQ_HEADER, MAX_WRITE_BODY, RelayState, build_router};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::gateway::{InMemoryRegistry, SessionOptions};
use crate::net::BufferPool;

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

/// Binds every listen address and serves them all from one registry until
/// `cancel` fires.
pub async fn run(config: &RelayConfig, cancel: CancellationToken) -> std::io::Result<()> {
    let mut listeners = Vec::with_capacity(config.listen.len());
    for addr in &config.listen {
        listeners.push(TcpListener::bind(addr).await?);
    }

    let buffers = BufferPool::new(config.buffsize);
    info!(
        "frames of up to {} bytes, {} queued per session",
        buffers.buffer_size(),
        config.chanlen
    );

    let state = RelayState::new(
        Arc::new(InMemoryRegistry::new()),
        buffers,
        SessionOptions {
            chanlen: config.chanlen,
            connect_timeout: config.connect_timeout,
        },
    );

    serve(listeners, state, cancel).await
}

pub async fn serve(
    listeners: Vec<TcpListener>,
    state: RelayState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let router = build_router(state);
    let mut servers = JoinSet::new();

    for listener in listeners {
        let addr: SocketAddr = listener.local_addr()?;
        info!("relay on {addr}");

        let router = router.clone();
        let shutdown = cancel.clone().cancelled_owned();
        servers.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .inspect_err(|e| error!("relay {addr} stopped: {e}"))
        });
    }

    while let Some(res) = servers.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                cancel.cancel();
                return Err(e);
            }
            Err(e) => error!("relay listener task: {e}"),
        }
    }

    Ok(())
}
