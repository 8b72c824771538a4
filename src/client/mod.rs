//! Frame relay client: accepts local connections and spreads each one over
//! every configured relay endpoint.

pub mod distributor;
pub mod relay_client;
pub mod reorder;

pub use distributor::{ConnectionStats, relay_connection};
pub use relay_client::RelayClient;
pub use reorder::{MAX_PARKED, Pushed, Reorderer};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ClientConfig;

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

pub async fn run(config: &ClientConfig, cancel: CancellationToken) -> std::io::Result<()> {
    let client = RelayClient::new(&config.servers)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    for server in client.endpoints() {
        info!("{} => {} => {}", config.listen, server, config.service);
    }

    let listener = TcpListener::bind(config.listen).await?;
    serve(listener, client, config.service.clone(), config.buffsize, cancel).await;
    Ok(())
}

/// Accept loop. Each connection gets its own task and session; the loop
/// returns once `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    client: RelayClient,
    service: String,
    buffsize: usize,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            accept_res = listener.accept() => {
                let (stream, peer) = match accept_res {
                    Ok(v) => v,
                    Err(e) => { error!("accept error: {e}"); continue; }
                };

                let _ = stream.set_nodelay(true);
                info!("new client {peer}");

                let client = client.clone();
                let service = service.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = relay_connection(stream, client, &service, buffsize, &cancel).await {
                        error!("client {peer} error: {e}");
                    }
                });
            }
        }
    }
}
