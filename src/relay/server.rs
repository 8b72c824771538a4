use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::RelayError;
use crate::gateway::{self, Session, SessionOptions, SessionRegistry};
use crate::net::BufferPool;
use crate::shared_types::{RelayOp, SessionId};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Response header carrying a frame's position in the backend stream.
pub const FRAME_SEQ_HEADER: &str = "x-frame-seq";

/// Largest body a relay accepts on `write`.
pub const MAX_WRITE_BODY: usize = 16 * 1024 * 1024;

// -----------------------------------------------------------------------------
// ----- RelayState ------------------------------------------------------------

/// Shared by every listener of one relay process, so a session created through
/// one address can be read and written through all of them.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<dyn SessionRegistry>,
    pub buffers: Arc<BufferPool>,
    pub options: SessionOptions,
}

impl RelayState {
    pub fn new(registry: Arc<dyn SessionRegistry>, buffers: Arc<BufferPool>, options: SessionOptions) -> Self {
        Self {
            registry,
            buffers,
            options,
        }
    }

    fn session(&self, params: &IdParams) -> Result<Arc<Session>, RelayError> {
        let id = params.session_id()?;
        self.registry.lookup(&id).inspect_err(|_| {
            debug!("can not find session {id}");
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Router ----------------------------------------------------------------

pub fn build_router(state: RelayState) -> Router {
    Router::new()
        .route(RelayOp::Create.route(), post(create_handler))
        .route(RelayOp::Read.route(), get(read_handler))
        .route(RelayOp::Write.route(), post(write_handler))
        .route(RelayOp::Close.route(), post(close_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_WRITE_BODY))
        .with_state(state)
}

// -----------------------------------------------------------------------------
// ----- Params ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateParams {
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: Option<String>,
    seq: Option<u64>,
}

impl IdParams {
    fn session_id(&self) -> Result<SessionId, RelayError> {
        let raw = self.id.as_deref().ok_or(RelayError::MissingParam("id"))?;
        raw.parse()
            .map_err(|_| RelayError::InvalidSessionId(raw.to_string()))
    }
}

// -----------------------------------------------------------------------------
// ----- Handlers --------------------------------------------------------------

async fn create_handler(
    State(state): State<RelayState>,
    Query(params): Query<CreateParams>,
) -> Result<String, RelayError> {
    let service = params
        .service
        .filter(|s| !s.is_empty())
        .ok_or(RelayError::MissingParam("service"))?;

    let id = gateway::create_session(&state.registry, &service, state.options, &state.buffers)
        .await
        .inspect_err(|e| warn!("create session for {service}: {e}"))?;

    Ok(id.to_string())
}

async fn read_handler(
    State(state): State<RelayState>,
    Query(params): Query<IdParams>,
) -> Result<Response, RelayError> {
    let session = state.session(&params)?;
    let frame = session.read_frame().await?;

    // The frame's buffer goes back to the pool as soon as it is copied out.
    let body = Bytes::copy_from_slice(&frame.data);
    let seq = frame.seq;
    drop(frame);

    Ok(([(FRAME_SEQ_HEADER, seq.to_string())], body).into_response())
}

async fn write_handler(
    State(state): State<RelayState>,
    Query(params): Query<IdParams>,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    let session = state.session(&params)?;

    if let Err(e) = session.write(params.seq, body).await {
        if matches!(e, RelayError::BackendIo(_)) {
            state.registry.remove(&session.id());
        }
        return Err(e);
    }

    Ok(StatusCode::OK)
}

async fn close_handler(
    State(state): State<RelayState>,
    Query(params): Query<IdParams>,
) -> Result<StatusCode, RelayError> {
    let id = params.session_id()?;

    if let Some(session) = state.registry.remove(&id) {
        session.close().await;
        info!("session {id} closed by client");
    }

    Ok(StatusCode::OK)
}

async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    format!("sessions={}", state.registry.len())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
