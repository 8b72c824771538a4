use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::RelayError;
use crate::net::Dialer;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

// -----------------------------------------------------------------------------
// ----- PreDialed -------------------------------------------------------------

/// A connection dialed before anyone asked for it.
///
/// `cancel` is the token the dial ran under. Whoever takes the entry owns
/// both and cancels the token once the connection is finished with.
#[derive(Debug)]
pub struct PreDialed<C> {
    pub conn: C,
    pub cancel: CancellationToken,
}

// -----------------------------------------------------------------------------
// ----- WarmPoolStats ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmPoolStats {
    pub attempts: u64,
    pub failures: u64,
    pub handed_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    failures: AtomicU64,
    handed_out: AtomicU64,
}

// -----------------------------------------------------------------------------
// ----- WarmPool --------------------------------------------------------------

/// Keeps exactly one dialed connection waiting for the next consumer.
///
/// A background task waits for the hand-off slot to be free, dials, and parks
/// the result in the slot. Failed dials are logged and retried after
/// `backoff`, forever; they never reach a consumer.
#[derive(Debug)]
pub struct WarmPool<C> {
    label: String,
    rx: Mutex<mpsc::Receiver<PreDialed<C>>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// -----------------------------------------------------------------------------
// ----- WarmPool: Static ------------------------------------------------------

impl<C> WarmPool<C>
where
    C: Send + 'static,
{
    pub fn spawn<D>(dialer: D, backoff: Duration, parent: &CancellationToken) -> Self
    where
        D: Dialer<Conn = C>,
    {
        let label = dialer.label();
        let (tx, rx) = mpsc::channel(1);
        let counters = Arc::new(Counters::default());
        let cancel = parent.child_token();

        info!("pre-dialing {label} (backoff {})", humantime::format_duration(backoff));

        let task = tokio::spawn(predial_loop(
            dialer,
            backoff,
            tx,
            counters.clone(),
            cancel.clone(),
        ));

        Self {
            label,
            rx: Mutex::new(rx),
            counters,
            cancel,
            task,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- WarmPool: Public ------------------------------------------------------

impl<C> WarmPool<C> {
    /// Waits for the next ready connection. Fails only after `shutdown`.
    pub async fn take(&self) -> Result<PreDialed<C>, RelayError> {
        let entry = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(RelayError::PoolClosed)?;

        self.counters.handed_out.fetch_add(1, Ordering::Relaxed);
        Ok(entry)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stats(&self) -> WarmPoolStats {
        WarmPoolStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            handed_out: self.counters.handed_out.load(Ordering::Relaxed),
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<C> Drop for WarmPool<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Loop --------------------------------------------------------

async fn predial_loop<D: Dialer>(
    dialer: D,
    backoff: Duration,
    tx: mpsc::Sender<PreDialed<D::Conn>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        // Only dial once a consumer can take the result.
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        counters.attempts.fetch_add(1, Ordering::Relaxed);
        let dial_cancel = cancel.child_token();

        match dialer.dial(&dial_cancel).await {
            Ok(conn) => {
                debug!("pre-dialed {}", dialer.label());
                permit.send(PreDialed {
                    conn,
                    cancel: dial_cancel,
                });
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                drop(permit);
                if cancel.is_cancelled() {
                    break;
                }
                warn!("pre-dial {} failed: {e}", dialer.label());

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    debug!("pre-dial loop for {} stopped", dialer.label());
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
