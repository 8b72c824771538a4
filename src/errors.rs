use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::shared_types::{RelayOp, SessionId};

// -----------------------------------------------------------------------------
// ----- RelayError ------------------------------------------------------------

/// Everything that can go wrong between a local connection, a relay endpoint
/// and a backend service.
///
/// Dial failures are retried by the warm pool and surfaced by on-demand
/// session creation. Backend I/O failures are terminal for their session,
/// local I/O failures are terminal for their connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("dial {target} failed: {source}")]
    Dial {
        target: String,
        source: std::io::Error,
    },

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("session closed")]
    SessionClosed,

    #[error("backend io: {0}")]
    BackendIo(#[source] std::io::Error),

    #[error("local io: {0}")]
    LocalIo(#[source] std::io::Error),

    #[error("write seq {seq} outside window (next expected {next})")]
    SequenceOverflow { seq: u64, next: u64 },

    #[error("missing query parameter '{0}'")]
    MissingParam(&'static str),

    #[error("relay transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("relay {op} returned {status}")]
    Status { op: RelayOp, status: StatusCode },

    #[error("pre-dial pool closed")]
    PoolClosed,
}

// -----------------------------------------------------------------------------
// ----- RelayError: Public ----------------------------------------------------

impl RelayError {
    pub fn dial(target: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Dial {
            target: target.into(),
            source,
        }
    }

    /// Status code a relay endpoint answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::InvalidSessionId(_) | RelayError::MissingParam(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::SequenceOverflow { .. } => StatusCode::CONFLICT,
            RelayError::Dial { .. }
            | RelayError::SessionClosed
            | RelayError::BackendIo(_)
            | RelayError::Transport(_)
            | RelayError::Status { .. } => StatusCode::BAD_GATEWAY,
            RelayError::LocalIo(_) | RelayError::PoolClosed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RelayError::SessionNotFound(_)
                | RelayError::Status {
                    status: StatusCode::NOT_FOUND,
                    ..
                }
        )
    }
}

// -----------------------------------------------------------------------------
// ----- RelayError: IntoResponse ----------------------------------------------

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
