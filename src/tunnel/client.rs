use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::splice_accepted;
use crate::config::TunnelClientConfig;
use crate::gateway::WarmPool;
use crate::net::MultiPathDialer;

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

/// Local listener whose connections leave over whichever configured path the
/// pool managed to dial.
pub async fn run(config: &TunnelClientConfig, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    info!("listen tcp at {}", config.listen);

    let dialer = MultiPathDialer::from_specs("mptcp", config.paths.clone(), config.connect_timeout);
    info!("aggregating {} path(s)", dialer.len());

    let pool = Arc::new(WarmPool::spawn(dialer, config.backoff, &cancel));
    splice_accepted(listener, pool, cancel).await;
    Ok(())
}
