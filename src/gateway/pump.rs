use std::sync::Arc;
use std::time::Duration;

use bytes::BufMut;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::registry::SessionRegistry;
use super::session::{BackendReader, Frame, Session};
use crate::net::BufferPool;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Upper bound on how long a session whose backend is gone stays registered
/// waiting for readers to collect its queued frames.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

// -----------------------------------------------------------------------------
// ----- PumpExit --------------------------------------------------------------

#[derive(Debug)]
enum PumpExit {
    Eof,
    ReadError(std::io::Error),
    Cancelled,
}

// -----------------------------------------------------------------------------
// ----- Frame Pump ------------------------------------------------------------

/// Starts the task that moves backend bytes into the session's inbound queue.
///
/// A full queue blocks the pump, which stops reads from the backend socket and
/// lets TCP flow control push back on the service. The pump never retries.
/// On EOF it shuts the backend and lets readers drain what is already queued
/// before closing and deregistering the session; a read error closes and
/// deregisters at once.
pub(crate) fn spawn(
    session: Arc<Session>,
    reader: BackendReader,
    tx: mpsc::Sender<Frame>,
    buffers: Arc<BufferPool>,
    registry: Arc<dyn SessionRegistry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit = run(&session, reader, tx, &buffers).await;

        match &exit {
            PumpExit::Eof => debug!("session {} backend {} closed", session.id(), session.service()),
            PumpExit::ReadError(e) => {
                warn!("session {} backend {} read: {e}", session.id(), session.service())
            }
            PumpExit::Cancelled => debug!("session {} pump cancelled", session.id()),
        }

        if matches!(exit, PumpExit::Eof) {
            session.shutdown_backend().await;

            let cancel = session.cancel_token().clone();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = session.wait_drained() => {}
                _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
                    debug!("session {} not drained in time", session.id());
                }
            }
        }

        session.close().await;
        registry.remove(&session.id());
    })
}

// -----------------------------------------------------------------------------
// ----- Internal: Loop --------------------------------------------------------

async fn run(
    session: &Session,
    mut reader: BackendReader,
    tx: mpsc::Sender<Frame>,
    buffers: &Arc<BufferPool>,
) -> PumpExit {
    let cancel = session.cancel_token();
    let mut seq = 0u64;

    loop {
        let mut data = buffers.acquire();
        let room = data.remaining();

        let read = {
            let mut limited = BufMut::limit(data.inner_mut(), room);
            tokio::select! {
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                res = reader.read_buf(&mut limited) => res,
            }
        };

        match read {
            Ok(0) => return PumpExit::Eof,
            Ok(n) => trace!("session {} frame {seq}: {n} bytes", session.id()),
            Err(e) => return PumpExit::ReadError(e),
        }

        let frame = Frame { seq, data };
        seq += 1;

        tokio::select! {
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            res = tx.send(frame) => {
                if res.is_err() {
                    return PumpExit::Cancelled;
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
