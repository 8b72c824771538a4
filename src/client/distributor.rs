use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::relay_client::RelayClient;
use super::reorder::{Pushed, Reorderer};
use crate::errors::RelayError;
use crate::shared_types::SessionId;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// How long a gap in the frame sequence may stay open before the connection
/// is torn down.
pub const GAP_TIMEOUT: Duration = Duration::from_secs(30);

// -----------------------------------------------------------------------------
// ----- ConnectionStats -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub id: SessionId,
    pub sent: u64,
    pub received: u64,
}

// -----------------------------------------------------------------------------
// ----- relay_connection ------------------------------------------------------

/// Carries one accepted local connection over the relay endpoints.
///
/// Opens a session, then:
/// - writes: each chunk read locally goes to a random endpoint, one at a time,
///   numbered so the relay can commit them in order;
/// - reads: one task per endpoint keeps pulling frames; a single writer puts
///   them back in order before they reach the local connection.
///
/// Local EOF, a failed write or a frame that never arrives tears the session
/// down. Returns once every task spawned for the connection has finished.
pub async fn relay_connection(
    local: TcpStream,
    client: RelayClient,
    service: &str,
    buffsize: usize,
    cancel: &CancellationToken,
) -> Result<ConnectionStats, RelayError> {
    let id = client.create(service).await?;
    info!("session {id} via {} endpoint(s)", client.len());

    let (local_read, local_write) = local.into_split();
    let conn_cancel = cancel.child_token();

    // Bounded so a slow local reader pushes back on the read tasks.
    let (frame_tx, frame_rx) = mpsc::channel(client.len().max(1) * 2);

    let mut readers = JoinSet::new();
    for endpoint in 0..client.len() {
        readers.spawn(read_loop(
            client.clone(),
            endpoint,
            id,
            frame_tx.clone(),
            conn_cancel.clone(),
        ));
    }
    drop(frame_tx);

    let local_writer = tokio::spawn(deliver_in_order(
        local_write,
        frame_rx,
        Reorderer::new(),
        GAP_TIMEOUT,
        conn_cancel.clone(),
    ));

    let sent = write_loop(local_read, &client, id, buffsize, &conn_cancel).await;

    if let Err(e) = client.close(id).await {
        debug!("session {id} close: {e}");
    }
    conn_cancel.cancel();

    while readers.join_next().await.is_some() {}
    let received = local_writer.await.unwrap_or(0);

    let sent = sent?;
    info!("session {id} done (sent {sent} bytes, received {received} bytes)");

    Ok(ConnectionStats { id, sent, received })
}

// -----------------------------------------------------------------------------
// ----- Internal: Write Path --------------------------------------------------

async fn write_loop(
    mut local: OwnedReadHalf,
    client: &RelayClient,
    id: SessionId,
    buffsize: usize,
    cancel: &CancellationToken,
) -> Result<u64, RelayError> {
    let mut buf = BytesMut::with_capacity(buffsize);
    let mut seq = 0u64;
    let mut sent = 0u64;

    loop {
        buf.reserve(buffsize);
        let read = {
            let mut limited = BufMut::limit(&mut buf, buffsize);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(sent),
                res = local.read_buf(&mut limited) => res,
            }
        };

        let n = match read {
            Ok(0) => {
                debug!("session {id} local EOF");
                return Ok(sent);
            }
            Ok(n) => n,
            Err(e) => return Err(RelayError::LocalIo(e)),
        };

        let chunk: Bytes = buf.split().freeze();
        let endpoint = client.random_endpoint();

        tokio::select! {
            _ = cancel.cancelled() => return Ok(sent),
            res = client.write(endpoint, id, seq, chunk) => {
                if let Err(e) = res {
                    warn!("session {id} write via {}: {e}", client.endpoints()[endpoint]);
                    return Err(e);
                }
            }
        }

        seq += 1;
        sent += n as u64;
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Read Path ---------------------------------------------------

/// Pulls frames through one endpoint until it fails. No retry and no failover:
/// the other endpoints' tasks keep draining the session.
async fn read_loop(
    client: RelayClient,
    endpoint: usize,
    id: SessionId,
    frames: mpsc::Sender<(u64, Bytes)>,
    cancel: CancellationToken,
) {
    loop {
        let res = tokio::select! {
            _ = cancel.cancelled() => return,
            res = client.read(endpoint, id) => res,
        };

        match res {
            Ok(frame) => {
                if frames.send(frame).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("session {id} reader {} stopped: {e}", client.endpoints()[endpoint]);
                return;
            }
        }
    }
}

/// Writes frames to the local connection in sequence order. A gap that
/// overflows the reorder buffer, outlives `gap_timeout`, or is still open when
/// every reader has ended cancels the whole connection.
async fn deliver_in_order(
    mut local: OwnedWriteHalf,
    mut frames: mpsc::Receiver<(u64, Bytes)>,
    mut reorder: Reorderer,
    gap_timeout: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut received = 0u64;
    let mut gap_deadline: Option<Instant> = None;

    loop {
        let stalled = async move {
            match gap_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let (seq, data) = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = stalled => {
                warn!(
                    "frame {} missing for {}, dropping connection",
                    reorder.next_seq(),
                    humantime::format_duration(gap_timeout)
                );
                cancel.cancel();
                break;
            }
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match reorder.push(seq, data) {
            Pushed::Accepted => {}
            Pushed::Duplicate => {
                warn!("dropping duplicate frame {seq}");
                continue;
            }
            Pushed::Overflow => {
                warn!(
                    "{} frame(s) parked behind missing frame {}, dropping connection",
                    reorder.parked(),
                    reorder.next_seq()
                );
                cancel.cancel();
                break;
            }
        }

        let before = reorder.next_seq();
        while let Some(chunk) = reorder.pop_ready() {
            if let Err(e) = local.write_all(&chunk).await {
                debug!("local write: {e}");
                cancel.cancel();
                return received;
            }
            received += chunk.len() as u64;
        }

        gap_deadline = match (reorder.parked(), gap_deadline) {
            (0, _) => None,
            (_, Some(deadline)) if reorder.next_seq() == before => Some(deadline),
            _ => Some(Instant::now() + gap_timeout),
        };
    }

    if reorder.parked() > 0 {
        warn!(
            "{} frame(s) after seq {} never became deliverable",
            reorder.parked(),
            reorder.next_seq()
        );
        cancel.cancel();
    }

    // Nothing more will reach the local side.
    let _ = local.shutdown().await;
    received
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn local_pair() -> (OwnedWriteHalf, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let (_, write_half) = accepted.into_split();
        (write_half, peer)
    }

    fn frame(seq: u64, data: &'static [u8]) -> (u64, Bytes) {
        (seq, Bytes::from_static(data))
    }

    #[tokio::test]
    async fn delivers_out_of_order_frames_in_sequence() {
        let (local, mut peer) = local_pair().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(deliver_in_order(
            local,
            rx,
            Reorderer::new(),
            GAP_TIMEOUT,
            cancel.clone(),
        ));

        tx.send(frame(2, b"C")).await.unwrap();
        tx.send(frame(0, b"A")).await.unwrap();
        tx.send(frame(1, b"B")).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 3);
        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"ABC");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn overflow_behind_a_lost_frame_cancels_the_connection() {
        let (local, mut peer) = local_pair().await;
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(deliver_in_order(
            local,
            rx,
            Reorderer::with_limit(4),
            GAP_TIMEOUT,
            cancel.clone(),
        ));

        // Frame 0 never arrives.
        for seq in 1..=8 {
            if tx.send(frame(seq, b"x")).await.is_err() {
                break;
            }
        }

        let received = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("delivery did not stop")
            .unwrap();
        assert_eq!(received, 0);
        assert!(cancel.is_cancelled());

        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn gap_left_after_readers_end_cancels_the_connection() {
        let (local, _peer) = local_pair().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(deliver_in_order(
            local,
            rx,
            Reorderer::new(),
            GAP_TIMEOUT,
            cancel.clone(),
        ));

        tx.send(frame(0, b"A")).await.unwrap();
        tx.send(frame(2, b"C")).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 1);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn gap_that_stays_open_times_out() {
        let (local, _peer) = local_pair().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(deliver_in_order(
            local,
            rx,
            Reorderer::new(),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        tx.send(frame(1, b"B")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("gap never timed out")
            .unwrap();
        assert_eq!(received, 0);
        assert!(cancel.is_cancelled());
        drop(tx);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
