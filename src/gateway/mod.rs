pub mod pump;
pub mod registry;
pub mod session;
pub mod warm_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{InMemoryRegistry, SessionRegistry};
pub use session::{DEFAULT_CHANLEN, Frame, Session, WRITE_WINDOW};
pub use warm_pool::{DEFAULT_BACKOFF, PreDialed, WarmPool, WarmPoolStats};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::RelayError;
use crate::net::{BufferPool, Dialer, PathSpec, TargetedDialer};
use crate::shared_types::SessionId;

// -----------------------------------------------------------------------------
// ----- SessionOptions --------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Inbound queue capacity, in frames.
    pub chanlen: usize,
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chanlen: DEFAULT_CHANLEN,
            connect_timeout: crate::net::dialer::DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- create_session --------------------------------------------------------

/// Dials `service`, registers a fresh session around the connection and
/// starts its frame pump. Nothing is registered if the dial fails.
pub async fn create_session(
    registry: &Arc<dyn SessionRegistry>,
    service: &str,
    options: SessionOptions,
    buffers: &Arc<BufferPool>,
) -> Result<SessionId, RelayError> {
    let dialer = TargetedDialer::new(PathSpec::new("backend", service))
        .with_timeout(options.connect_timeout);
    let backend = dialer.dial(&CancellationToken::new()).await?;

    let id = SessionId::random();
    Session::start(
        id,
        service,
        backend,
        options.chanlen,
        buffers.clone(),
        registry.clone(),
    );

    info!("session {id} -> {service}");
    Ok(id)
}
