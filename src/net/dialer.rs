use std::future::Future;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::RelayError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------------------------------------
// ----- Dialer ----------------------------------------------------------------

/// Supplies ready-to-use outbound connections to a remote endpoint.
///
/// Implementations must give up promptly once `cancel` fires and must not
/// leave anything behind on failure.
pub trait Dialer: Send + Sync + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Conn, RelayError>> + Send;

    /// `endpoint|address`, diagnostics only.
    fn label(&self) -> String;
}

// -----------------------------------------------------------------------------
// ----- PathSpec --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub label: String,
    pub address: String,
}

impl PathSpec {
    pub fn new(label: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            address: address.into(),
        }
    }

    /// Labels unnamed addresses `no.{first}`, `no.{first + 1}`, ... in list
    /// order.
    pub fn numbered(first: usize, addresses: &[String]) -> Vec<PathSpec> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| PathSpec::new(format!("no.{}", first + i), addr.clone()))
            .collect()
    }
}

// -----------------------------------------------------------------------------
// ----- TargetedDialer --------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TargetedDialer {
    path: PathSpec,
    connect_timeout: Duration,
}

impl TargetedDialer {
    pub fn new(path: PathSpec) -> Self {
        Self {
            path,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.path.address
    }
}

impl Dialer for TargetedDialer {
    type Conn = TcpStream;

    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream, RelayError> {
        let address = self.address();

        let connect = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address));

        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RelayError::dial(
                    address,
                    std::io::Error::new(std::io::ErrorKind::Interrupted, "dial cancelled"),
                ));
            }
            res = connect => match res {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(RelayError::dial(address, e)),
                Err(_) => {
                    return Err(RelayError::dial(
                        address,
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                    ));
                }
            },
        };

        let _ = stream.set_nodelay(true);

        if let Ok(local) = stream.local_addr() {
            debug!("dialed {local}->{address} ({})", self.label());
        }

        Ok(stream)
    }

    fn label(&self) -> String {
        format!("{}|{}", self.path.label, self.path.address)
    }
}

// -----------------------------------------------------------------------------
// ----- MultiPathDialer -------------------------------------------------------

/// Combines several paths behind one `Dialer`. Each dial walks the paths in a
/// fresh random order and returns the first that connects, so a dead uplink
/// only costs one failed attempt.
#[derive(Debug, Clone)]
pub struct MultiPathDialer {
    name: String,
    paths: Vec<TargetedDialer>,
}

impl MultiPathDialer {
    pub fn new(name: impl Into<String>, paths: Vec<TargetedDialer>) -> Self {
        Self {
            name: name.into(),
            paths,
        }
    }

    pub fn from_specs(
        name: impl Into<String>,
        specs: Vec<PathSpec>,
        connect_timeout: Duration,
    ) -> Self {
        let paths = specs
            .into_iter()
            .map(|spec| TargetedDialer::new(spec).with_timeout(connect_timeout))
            .collect();
        Self::new(name, paths)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Dialer for MultiPathDialer {
    type Conn = TcpStream;

    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream, RelayError> {
        let mut order: Vec<usize> = (0..self.paths.len()).collect();
        order.shuffle(&mut rand::rng());

        let mut last_err = None;
        for i in order {
            let path = &self.paths[i];
            match path.dial(cancel).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!("path {} unavailable: {e}", path.label());
                    last_err = Some(e);
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RelayError::dial(
                self.name.clone(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no paths configured"),
            )
        }))
    }

    fn label(&self) -> String {
        let members: Vec<String> = self.paths.iter().map(|p| p.label()).collect();
        format!("{}|{}", self.name, members.join(","))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
