//! Aggregated-path tunnel: every accepted connection is spliced onto a
//! connection the warm pool dialed ahead of time.

pub mod client;
pub mod server;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::gateway::WarmPool;
use crate::net::bi_copy;

// -----------------------------------------------------------------------------
// ----- splice_accepted -------------------------------------------------------

/// Accept loop shared by both tunnel ends. The only wait on the accept path is
/// for the pool's next entry.
pub async fn splice_accepted<C>(
    listener: TcpListener,
    pool: Arc<WarmPool<C>>,
    cancel: CancellationToken,
) where
    C: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            accept_res = listener.accept() => {
                let (stream, peer) = match accept_res {
                    Ok(v) => v,
                    Err(e) => { error!("accept error: {e}"); continue; }
                };

                let _ = stream.set_nodelay(true);
                info!("new conn {peer}");

                let pool = pool.clone();
                tokio::spawn(async move {
                    let entry = match pool.take().await {
                        Ok(entry) => entry,
                        Err(e) => { error!("conn {peer}: {e}"); return; }
                    };
                    debug!("conn {peer} spliced onto {}", pool.label());

                    bi_copy(&peer.to_string(), stream, entry.conn).await;
                    entry.cancel.cancel();
                });
            }
        }
    }

    pool.shutdown();
}
