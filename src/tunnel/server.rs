use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::splice_accepted;
use crate::config::TunnelServerConfig;
use crate::gateway::WarmPool;
use crate::net::{PathSpec, TargetedDialer};

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

/// Tunnel endpoint: pairs each incoming tunnel connection with a backend
/// connection dialed before it arrived.
pub async fn run(config: &TunnelServerConfig, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    info!("listen tunnel at {} -> {}", config.listen, config.remote);

    let dialer = TargetedDialer::new(PathSpec::new("remote", config.remote.clone()))
        .with_timeout(config.connect_timeout);

    let pool = Arc::new(WarmPool::spawn(dialer, config.backoff, &cancel));
    splice_accepted(listener, pool, cancel).await;
    Ok(())
}
