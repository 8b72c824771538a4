use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const COPY_BUFFER_SIZE: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// ----- BiCopyStats -----------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiCopyStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

// -----------------------------------------------------------------------------
// ----- bi_copy ---------------------------------------------------------------

/// Pumps bytes both ways between `a` and `b` until both directions are done.
///
/// Each direction copies until its source hits EOF or an error, then shuts
/// down its destination so the peer sees the half-close. The first direction
/// to finish also cancels the other one, which otherwise could wait forever on
/// a peer that never closes. Both streams are dropped before this returns.
pub async fn bi_copy<A, B>(name: &str, a: A, b: B) -> BiCopyStats
where
    A: AsyncRead + AsyncWrite + Send,
    B: AsyncRead + AsyncWrite + Send,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    let done = CancellationToken::new();

    let (a_to_b, b_to_a) = tokio::join!(
        copy_then_close(name, "a->b", &mut a_read, &mut b_write, &done),
        copy_then_close(name, "b->a", &mut b_read, &mut a_write, &done),
    );

    let stats = BiCopyStats { a_to_b, b_to_a };
    info!(
        "{name} close (a->b {} bytes, b->a {} bytes)",
        stats.a_to_b, stats.b_to_a
    );
    stats
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn copy_then_close<R, W>(
    name: &str,
    direction: &str,
    src: &mut ReadHalf<R>,
    dst: &mut WriteHalf<W>,
    done: &CancellationToken,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let n = tokio::select! {
            _ = done.cancelled() => break,
            res = src.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("{name} {direction} read: {e}");
                    break;
                }
            },
        };

        let write = tokio::select! {
            _ = done.cancelled() => break,
            res = dst.write_all(&buf[..n]) => res,
        };
        if let Err(e) = write {
            debug!("{name} {direction} write: {e}");
            break;
        }
        copied += n as u64;
    }

    let _ = dst.shutdown().await;
    done.cancel();
    copied
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn copies_both_directions_and_closes() {
        let (a_local, mut a_peer) = duplex(1024);
        let (b_local, mut b_peer) = duplex(1024);

        let engine = tokio::spawn(async move { bi_copy("test", a_local, b_local).await });

        a_peer.write_all(b"ping").await.unwrap();
        let mut got = [0u8; 4];
        b_peer.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ping");

        b_peer.write_all(b"pong!").await.unwrap();
        let mut got = [0u8; 5];
        a_peer.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"pong!");

        // Closing one side tears down the whole pair.
        drop(a_peer);
        let stats = tokio::time::timeout(Duration::from_secs(5), engine)
            .await
            .expect("engine should finish")
            .unwrap();
        assert_eq!(stats, BiCopyStats { a_to_b: 4, b_to_a: 5 });

        let mut rest = Vec::new();
        b_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn silent_peer_does_not_hang_engine() {
        let (a_local, a_peer) = duplex(64);
        let (b_local, _b_peer) = duplex(64);

        drop(a_peer);
        let res = tokio::time::timeout(Duration::from_secs(5), bi_copy("t", a_local, b_local)).await;
        assert!(res.is_ok());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
