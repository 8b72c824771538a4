use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use reqwest::{Response, StatusCode};
use tracing::trace;

use crate::errors::RelayError;
use crate::relay::FRAME_SEQ_HEADER;
use crate::shared_types::{RelayOp, SessionId};

// -----------------------------------------------------------------------------
// ----- RelayClient -----------------------------------------------------------

/// HTTP client for a fixed set of relay endpoints. Cheap to clone; clones
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoints: Arc<[String]>,
}

// -----------------------------------------------------------------------------
// ----- RelayClient: Static ---------------------------------------------------

impl RelayClient {
    pub fn new(servers: &[String]) -> Result<Self, RelayError> {
        if servers.is_empty() {
            return Err(RelayError::MissingParam("servers"));
        }

        let http = reqwest::Client::builder().tcp_nodelay(true).build()?;
        let endpoints: Vec<String> = servers.iter().map(|s| normalize_endpoint(s)).collect();

        Ok(Self {
            http,
            endpoints: endpoints.into(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- RelayClient: Public ---------------------------------------------------

impl RelayClient {
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Uniform pick among all endpoints.
    pub fn random_endpoint(&self) -> usize {
        rand::rng().random_range(0..self.endpoints.len().max(1))
    }

    /// Opens a session on the first endpoint.
    pub async fn create(&self, service: &str) -> Result<SessionId, RelayError> {
        let resp = self
            .http
            .post(self.url(0, RelayOp::Create))
            .query(&[("service", service)])
            .send()
            .await?;

        let body = check(RelayOp::Create, resp)?.text().await?;
        body.parse()
            .map_err(|_| RelayError::InvalidSessionId(body.clone()))
    }

    /// Takes one frame of the session through `endpoint`. Blocks on the relay
    /// until a frame is available.
    pub async fn read(&self, endpoint: usize, id: SessionId) -> Result<(u64, Bytes), RelayError> {
        let resp = self
            .http
            .get(self.url(endpoint, RelayOp::Read))
            .query(&[("id", id.to_string())])
            .send()
            .await?;

        let resp = check(RelayOp::Read, resp)?;
        let seq = resp
            .headers()
            .get(FRAME_SEQ_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or(RelayError::MissingParam(FRAME_SEQ_HEADER))?;

        let data = resp.bytes().await?;
        trace!("read frame {seq} ({} bytes) via {}", data.len(), self.endpoints[endpoint]);
        Ok((seq, data))
    }

    pub async fn write(
        &self,
        endpoint: usize,
        id: SessionId,
        seq: u64,
        data: Bytes,
    ) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url(endpoint, RelayOp::Write))
            .query(&[("id", id.to_string()), ("seq", seq.to_string())])
            .body(data)
            .send()
            .await?;

        check(RelayOp::Write, resp)?;
        Ok(())
    }

    /// Tears the session down on the endpoint that created it.
    pub async fn close(&self, id: SessionId) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url(0, RelayOp::Close))
            .query(&[("id", id.to_string())])
            .send()
            .await?;

        check(RelayOp::Close, resp)?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- RelayClient: Private --------------------------------------------------

impl RelayClient {
    fn url(&self, endpoint: usize, op: RelayOp) -> String {
        format!("{}{}", self.endpoints[endpoint], op.route())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn check(op: RelayOp, resp: Response) -> Result<Response, RelayError> {
    let status = resp.status();
    if status != StatusCode::OK {
        return Err(RelayError::Status { op, status });
    }
    Ok(resp)
}

fn normalize_endpoint(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
