use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pump;
use super::registry::SessionRegistry;
use crate::errors::RelayError;
use crate::net::{BufferPool, PooledBuf};
use crate::shared_types::SessionId;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_CHANLEN: usize = 100;

/// How far ahead of the next expected write a sequenced chunk may arrive.
pub const WRITE_WINDOW: u64 = 64;

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

pub type BackendReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BackendWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One chunk read from the backend, tagged with its position in the stream.
#[derive(Debug)]
pub struct Frame {
    pub seq: u64,
    pub data: PooledBuf,
}

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

/// Tunnel state for one backend connection.
///
/// The backend is split in two: the read half lives in the frame pump task,
/// the write half lives behind `writer`.
pub struct Session {
    id: SessionId,
    service: String,

    /// Write guard. Held for the whole of a backend write so chunks never
    /// interleave; also owns the reorder window for sequenced writes.
    writer: Mutex<WriteState>,

    /// Consumer side of the inbound queue. Readers take turns on the lock, so
    /// each frame reaches exactly one of them.
    inbound: Mutex<mpsc::Receiver<Frame>>,

    /// Signalled when a reader finds the inbound queue closed and empty.
    drained: Notify,

    /// Set once by `close`; never cleared.
    closed: AtomicBool,

    /// Lifetime of every task working on this session.
    cancel: CancellationToken,
}

struct WriteState {
    conn: Option<BackendWriter>,
    next_seq: u64,
    pending: BTreeMap<u64, Bytes>,
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    /// Registers a session around an already-connected backend and starts its
    /// frame pump. The session is visible in `registry` before the pump runs.
    pub fn start<S>(
        id: SessionId,
        service: impl Into<String>,
        backend: S,
        chanlen: usize,
        buffers: Arc<BufferPool>,
        registry: Arc<dyn SessionRegistry>,
    ) -> Arc<Session>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(backend);
        let (tx, rx) = mpsc::channel(chanlen.max(1));

        let session = Arc::new(Session {
            id,
            service: service.into(),
            writer: Mutex::new(WriteState {
                conn: Some(Box::new(writer)),
                next_seq: 0,
                pending: BTreeMap::new(),
            }),
            inbound: Mutex::new(rx),
            drained: Notify::new(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        registry.insert(session.clone());
        pump::spawn(session.clone(), Box::new(reader), tx, buffers, registry);

        session
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Public -------------------------------------------------------

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Takes the next frame off the inbound queue, waiting for the pump if the
    /// queue is empty. Frames queued before the backend went away are still
    /// handed out; after that the session reports closed.
    pub async fn read_frame(&self) -> Result<Frame, RelayError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(frame) => Ok(frame),
            None => {
                self.drained.notify_one();
                Err(RelayError::SessionClosed)
            }
        }
    }

    /// Forwards `data` to the backend under the write guard.
    ///
    /// Without `seq` the chunk is written as it arrives. With `seq`, chunks are
    /// committed strictly in sequence order: an early chunk is parked until
    /// its predecessors show up. A backend failure closes the session.
    pub async fn write(&self, seq: Option<u64>, data: Bytes) -> Result<(), RelayError> {
        let mut state = self.writer.lock().await;
        if state.conn.is_none() {
            return Err(RelayError::SessionClosed);
        }

        let ready: Vec<Bytes> = match seq {
            None => vec![data],
            Some(seq) => {
                let next = state.next_seq;
                if seq < next || seq - next >= WRITE_WINDOW || state.pending.contains_key(&seq) {
                    return Err(RelayError::SequenceOverflow { seq, next });
                }
                state.pending.insert(seq, data);

                let mut ready = Vec::new();
                let mut next = next;
                while let Some(chunk) = state.pending.remove(&next) {
                    ready.push(chunk);
                    next += 1;
                }
                state.next_seq = next;
                ready
            }
        };

        let res = match state.conn.as_mut() {
            Some(conn) => write_chunks(conn, &ready, &self.cancel).await,
            None => Err(RelayError::SessionClosed),
        };

        if let Err(e) = res {
            drop(state);
            warn!("session {} backend write failed: {e}", self.id);
            self.close().await;
            return Err(e);
        }

        Ok(())
    }

    /// Closes the backend and stops the frame pump. Safe to call any number
    /// of times from anywhere; only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("session {} closing ({})", self.id, self.service);
        self.cancel.cancel();
        self.shutdown_backend().await;
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Crate --------------------------------------------------------

impl Session {
    /// Drops the write side of the backend. Later writes fail with
    /// `SessionClosed`; queued frames stay readable.
    pub(super) async fn shutdown_backend(&self) {
        let conn = {
            let mut state = self.writer.lock().await;
            state.pending.clear();
            state.conn.take()
        };

        if let Some(mut conn) = conn {
            let _ = conn.shutdown().await;
        }
    }

    pub(super) async fn wait_drained(&self) {
        self.drained.notified().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn write_chunks(
    conn: &mut BackendWriter,
    chunks: &[Bytes],
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    for chunk in chunks {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::SessionClosed),
            res = conn.write_all(chunk) => res.map_err(RelayError::BackendIo)?,
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
